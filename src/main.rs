use eframe::egui;
use outpaint_studio::app::OutpaintApp;
use outpaint_studio::config::AppConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ {}", e);
            return Err(e.into());
        }
    };
    log::info!("Starting with {:?}", config);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([900.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Outpaint Studio",
        options,
        Box::new(|_cc| Ok(Box::new(OutpaintApp::new(config)))),
    )?;
    Ok(())
}
