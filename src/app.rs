use crate::compositor::AspectRatio;
use crate::config::AppConfig;
use crate::drive::{
    BrowserConsent, DriveClient, DriveEntry, DriveError, DriveSession, EntryKind, ListingOutcome,
    ListingRequest, ListingStatus, Navigator, Selection, DRIVE_READONLY_SCOPE,
};
use crate::genai_client::GeminiClient;
use crate::ui_theme::StudioTheme;
use crate::workflow::{
    compose_user_message, run_describe, run_expand, ExpandedImage, SourceImage, Stage, Workflow,
};
use eframe::egui;
use egui_extras::{Column, TableBuilder};
use std::fs;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

const DESCRIPTION_PLACEHOLDER: &str = "The AI description of your image appears here. Edit it to steer the expansion...";
const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "webp", "gif", "bmp"];
const MAX_LOGS: usize = 500;
const PREVIEW_SIZE: u32 = 1024;

/// Results reported back to the UI thread by background tasks.
pub enum AppEvent {
    Log(String),
    Described {
        ticket: u64,
        result: Result<String, String>,
    },
    Expanded {
        ticket: u64,
        result: Result<ExpandedImage, String>,
    },
    Listing {
        request: ListingRequest,
        result: Result<Vec<DriveEntry>, DriveError>,
    },
    Downloaded {
        ticket: u64,
        entry: DriveEntry,
        result: Result<Vec<u8>, DriveError>,
    },
}

enum DriveAction {
    Select(DriveEntry),
    Breadcrumb(usize),
    Refresh,
    SignOut,
}

pub struct OutpaintApp {
    config: AppConfig,
    gemini: Arc<GeminiClient>,
    drive: Option<Arc<DriveClient>>,
    drive_unavailable: Option<String>,

    // UI state
    workflow: Workflow,
    navigator: Navigator,
    show_drive_browser: bool,
    /// Ticket and file name of the Drive download in flight.
    downloading: Option<(u64, String)>,
    source_texture: Option<egui::TextureHandle>,
    result_texture: Option<egui::TextureHandle>,
    logs: Vec<String>,
    should_scroll_logs_to_bottom: bool,

    // Runtime
    runtime: tokio::runtime::Runtime,

    // Event channel
    event_sender: mpsc::UnboundedSender<AppEvent>,
    event_receiver: mpsc::UnboundedReceiver<AppEvent>,

    theme: StudioTheme,
}

impl OutpaintApp {
    pub fn new(config: AppConfig) -> Self {
        let runtime = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");
        let (event_sender, event_receiver) = mpsc::unbounded_channel::<AppEvent>();
        let mut logs = Vec::new();

        let gemini = Arc::new(
            GeminiClient::new(config.api_key.clone())
                .with_models(&config.settings.text_model, &config.settings.image_model),
        );

        let (drive, drive_unavailable) = match Self::connect_drive(&config) {
            Ok(client) => {
                logs.push("Google Drive browsing is available".to_string());
                (Some(Arc::new(client)), None)
            }
            Err(e) => {
                log::warn!("Drive disabled: {}", e);
                logs.push(format!("⚠ Google Drive disabled: {}", e));
                (None, Some(e.to_string()))
            }
        };

        Self {
            workflow: Workflow::new(config.settings.max_dimension),
            navigator: Navigator::new(),
            config,
            gemini,
            drive,
            drive_unavailable,
            show_drive_browser: false,
            downloading: None,
            source_texture: None,
            result_texture: None,
            logs,
            should_scroll_logs_to_bottom: false,
            runtime,
            event_sender,
            event_receiver,
            theme: StudioTheme::default(),
        }
    }

    fn connect_drive(config: &AppConfig) -> Result<DriveClient, DriveError> {
        let client_id = config
            .google_client_id
            .as_deref()
            .ok_or_else(|| DriveError::Configuration("GOOGLE_CLIENT_ID is not set".to_string()))?;

        let consent = BrowserConsent::new(config.consent_timeout());
        let session = DriveSession::new(Arc::new(consent));
        session.initialize(client_id, DRIVE_READONLY_SCOPE)?;

        Ok(DriveClient::new(Arc::new(session))
            .with_paging(config.settings.drive_page_size, config.settings.drive_max_pages))
    }

    fn log(&mut self, message: impl Into<String>) {
        self.logs.push(message.into());
        self.should_scroll_logs_to_bottom = true;
        if self.logs.len() > MAX_LOGS {
            let remove_count = self.logs.len() - MAX_LOGS;
            self.logs.drain(0..remove_count);
        }
    }

    /// Runs `task` on the runtime and posts its event back to the UI.
    fn spawn<F>(&self, ctx: &egui::Context, task: F)
    where
        F: Future<Output = AppEvent> + Send + 'static,
    {
        let sender = self.event_sender.clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let event = task.await;
            let _ = sender.send(event);
            ctx.request_repaint();
        });
    }

    // ------------------------------------------------------------------
    // Workflow actions
    // ------------------------------------------------------------------

    fn upload_local(&mut self, ctx: &egui::Context) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &IMAGE_EXTENSIONS)
            .pick_file()
        else {
            return;
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());

        match fs::read(&path) {
            Ok(bytes) => self.accept_source(ctx, name, None, bytes),
            Err(e) => {
                self.log(format!("❌ Failed to read {}: {}", path.display(), e));
                self.workflow.fail(format!("Could not read {}", name));
            }
        }
    }

    fn accept_source(
        &mut self,
        ctx: &egui::Context,
        name: String,
        mime_type: Option<&str>,
        bytes: Vec<u8>,
    ) {
        let source = match SourceImage::from_bytes(name.clone(), mime_type, bytes) {
            Ok(source) => source,
            Err(e) => {
                self.log(format!("❌ {}: {}", name, e));
                self.workflow.fail(compose_user_message(&e));
                return;
            }
        };

        self.source_texture = load_texture(ctx, "source", &source.bytes);
        self.result_texture = None;
        self.log(format!("🖼 Loaded {} ({}x{})", source.name, source.width, source.height));

        let job = self.workflow.load_source(source);
        let gemini = self.gemini.clone();
        self.spawn(ctx, async move {
            let result = run_describe(&gemini, &job).await;
            AppEvent::Described {
                ticket: job.ticket,
                result,
            }
        });
    }

    fn retry_describe(&mut self, ctx: &egui::Context) {
        match self.workflow.retry_describe() {
            Ok(job) => {
                let gemini = self.gemini.clone();
                self.spawn(ctx, async move {
                    let result = run_describe(&gemini, &job).await;
                    AppEvent::Described {
                        ticket: job.ticket,
                        result,
                    }
                });
            }
            Err(e) => self.log(format!("⚠ {}", e)),
        }
    }

    fn start_expand(&mut self, ctx: &egui::Context) {
        match self.workflow.begin_expand() {
            Ok(job) => {
                self.result_texture = None;
                self.log(format!(
                    "✨ Expanding to {} ({}x{} canvas)",
                    job.aspect_ratio,
                    job.aspect_ratio.canvas_size(job.max_dimension).0,
                    job.aspect_ratio.canvas_size(job.max_dimension).1
                ));
                let gemini = self.gemini.clone();
                self.spawn(ctx, async move {
                    let result = run_expand(&gemini, &job).await;
                    AppEvent::Expanded {
                        ticket: job.ticket,
                        result,
                    }
                });
            }
            Err(e) => self.log(format!("⚠ {}", e)),
        }
    }

    fn save_result(&mut self) {
        let Some(result) = self.workflow.result() else {
            return;
        };
        let extension = result.file_extension();
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Image", &[extension])
            .set_file_name(format!("expanded.{}", extension))
            .save_file()
        else {
            return;
        };

        let message = match fs::write(&path, &result.bytes) {
            Ok(()) => format!("💾 Saved {}", path.display()),
            Err(e) => format!("❌ Failed to save {}: {}", path.display(), e),
        };
        self.log(message);
    }

    fn reset(&mut self) {
        self.workflow.reset();
        self.downloading = None;
        self.source_texture = None;
        self.result_texture = None;
        self.log("Workflow reset");
    }

    // ------------------------------------------------------------------
    // Drive actions
    // ------------------------------------------------------------------

    fn open_drive_browser(&mut self, ctx: &egui::Context) {
        self.show_drive_browser = true;
        self.navigator.reset();
        let request = self.navigator.refresh();
        self.spawn_listing(ctx, request);
    }

    fn spawn_listing(&mut self, ctx: &egui::Context, request: ListingRequest) {
        let Some(drive) = self.drive.clone() else {
            return;
        };
        self.spawn(ctx, async move {
            let result = drive.list_children(&request.folder_id).await;
            AppEvent::Listing { request, result }
        });
    }

    fn apply_drive_action(&mut self, ctx: &egui::Context, action: DriveAction) {
        match action {
            DriveAction::Select(entry) => match self.navigator.select_entry(&entry) {
                Selection::Navigate(request) => self.spawn_listing(ctx, request),
                Selection::Picked(entry) => self.download_entry(ctx, entry),
                Selection::Ignored => {}
            },
            DriveAction::Breadcrumb(index) => match self.navigator.jump_to_breadcrumb(index) {
                Ok(request) => self.spawn_listing(ctx, request),
                Err(e) => self.log(format!("⚠ {}", e)),
            },
            DriveAction::Refresh => {
                let request = self.navigator.refresh();
                self.spawn_listing(ctx, request);
            }
            DriveAction::SignOut => self.sign_out(ctx),
        }
    }

    fn download_entry(&mut self, ctx: &egui::Context, entry: DriveEntry) {
        let Some(drive) = self.drive.clone() else {
            return;
        };
        let ticket = match self.workflow.begin_fetch() {
            Ok(ticket) => ticket,
            Err(e) => {
                self.log(format!("⚠ {}", e));
                return;
            }
        };
        self.show_drive_browser = false;
        self.downloading = Some((ticket, entry.name.clone()));
        self.log(format!("⬇ Downloading {} from Drive", entry.name));
        self.spawn(ctx, async move {
            let result = drive.download(&entry).await;
            AppEvent::Downloaded {
                ticket,
                entry,
                result,
            }
        });
    }

    fn sign_out(&mut self, ctx: &egui::Context) {
        let Some(drive) = self.drive.clone() else {
            return;
        };
        self.navigator.reset();
        self.show_drive_browser = false;
        if let Some(token) = drive.session().sign_out() {
            self.log("Signed out of Google Drive");
            self.spawn(ctx, async move {
                match drive.revoke(&token).await {
                    Ok(()) => AppEvent::Log("Drive token revoked".to_string()),
                    Err(e) => AppEvent::Log(format!("⚠ Token revocation failed: {}", e)),
                }
            });
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    fn process_events(&mut self, ctx: &egui::Context) {
        let mut events = Vec::new();
        while let Ok(event) = self.event_receiver.try_recv() {
            events.push(event);
        }

        for event in events {
            match event {
                AppEvent::Log(message) => self.log(message),
                AppEvent::Described { ticket, result } => {
                    let failure = result.as_ref().err().cloned();
                    if self.workflow.finish_describe(ticket, result) {
                        match failure {
                            Some(message) => self.log(format!("❌ {}", message)),
                            None => self.log("📝 Description ready"),
                        }
                    }
                }
                AppEvent::Expanded { ticket, result } => {
                    let texture = result
                        .as_ref()
                        .ok()
                        .and_then(|image| load_texture(ctx, "result", &image.bytes));
                    let failure = result.as_ref().err().cloned();
                    if self.workflow.finish_expand(ticket, result) {
                        match failure {
                            Some(message) => self.log(format!("❌ {}", message)),
                            None => {
                                self.result_texture = texture;
                                self.log("✅ Expanded image ready");
                            }
                        }
                    }
                }
                AppEvent::Listing { request, result } => {
                    let folder_id = request.folder_id.clone();
                    match self.navigator.complete(request, result) {
                        Ok(ListingOutcome::Applied) => {}
                        Ok(ListingOutcome::Stale) => {
                            log::debug!("Ignored an outdated listing of {}", folder_id)
                        }
                        Err(e) if e.is_auth() => {
                            self.log(format!("🔒 Google sign-in required: {}", e))
                        }
                        Err(e) => self.log(format!("❌ Listing {} failed: {}", folder_id, e)),
                    }
                }
                AppEvent::Downloaded {
                    ticket,
                    entry,
                    result,
                } => {
                    if self.downloading.as_ref().is_some_and(|(t, _)| *t == ticket) {
                        self.downloading = None;
                    }
                    if !self.workflow.is_current(ticket) {
                        log::debug!("Discarding superseded download of {}", entry.name);
                        continue;
                    }
                    match result {
                        Ok(bytes) => {
                            self.accept_source(ctx, entry.name.clone(), Some(entry.mime_type.as_str()), bytes)
                        }
                        Err(e) => {
                            self.log(format!("❌ Download of {} failed: {}", entry.name, e));
                            self.workflow.fail(format!("Could not download {}", entry.name));
                        }
                    }
                }
            }
        }
    }
}

impl eframe::App for OutpaintApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.theme.apply_to_ctx(ctx);
        self.process_events(ctx);

        egui::TopBottomPanel::bottom("logs")
            .resizable(true)
            .default_height(120.0)
            .show(ctx, |ui| self.show_logs_panel(ui));

        egui::SidePanel::left("controls")
            .resizable(false)
            .exact_width(340.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.add_space(self.theme.padding_medium);
                    self.show_source_panel(ui, ctx);
                    self.show_description_panel(ui, ctx);
                    self.show_aspect_panel(ui);
                    self.show_action_buttons(ui, ctx);
                });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(self.theme.padding_medium);
            self.show_status(ui);
            self.show_previews(ui);
        });

        if self.show_drive_browser {
            self.show_drive_window(ctx);
        }
    }
}

impl OutpaintApp {
    fn show_source_panel(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let busy = self.workflow.is_busy() || self.downloading.is_some();
        self.theme.card_frame().show(ui, |ui| {
            ui.label(self.theme.section_title("1. Choose an image"));
            ui.add_space(self.theme.spacing_medium);

            ui.horizontal(|ui| {
                if ui.add_enabled(!busy, egui::Button::new("Upload Image")).clicked() {
                    self.upload_local(ctx);
                }

                let drive_button = ui.add_enabled(
                    !busy && self.drive.is_some(),
                    egui::Button::new("Pick from Google Drive"),
                );
                let drive_button = match &self.drive_unavailable {
                    Some(reason) => drive_button.on_disabled_hover_text(reason.as_str()),
                    None => drive_button,
                };
                if drive_button.clicked() {
                    self.open_drive_browser(ctx);
                }
            });

            if let Some((_, name)) = &self.downloading {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(
                        egui::RichText::new(format!("Downloading {}...", name))
                            .color(self.theme.text_muted),
                    );
                });
            }

            if let Some(source) = self.workflow.source() {
                ui.add_space(self.theme.spacing_small);
                ui.label(
                    egui::RichText::new(format!(
                        "{} · {}x{} · {}",
                        source.name, source.width, source.height, source.mime_type
                    ))
                    .color(self.theme.text_secondary),
                );
            }
        });
        ui.add_space(self.theme.spacing_medium);
    }

    fn show_description_panel(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let describing = self.workflow.stage() == &Stage::Describing;
        let has_source = self.workflow.source().is_some();
        self.theme.card_frame().show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.label(self.theme.section_title("2. Description"));
                if describing {
                    ui.spinner();
                }
            });
            ui.add_space(self.theme.spacing_medium);

            ui.add_enabled(
                !describing,
                egui::TextEdit::multiline(&mut self.workflow.description)
                    .desired_rows(5)
                    .desired_width(f32::INFINITY)
                    .hint_text(DESCRIPTION_PLACEHOLDER),
            );

            if ui
                .add_enabled(has_source && !self.workflow.is_busy(), egui::Button::new("Describe again"))
                .clicked()
            {
                self.retry_describe(ctx);
            }
        });
        ui.add_space(self.theme.spacing_medium);
    }

    fn show_aspect_panel(&mut self, ui: &mut egui::Ui) {
        let max_dimension = self.config.settings.max_dimension;
        self.theme.card_frame().show(ui, |ui| {
            ui.label(self.theme.section_title("3. Target aspect ratio"));
            ui.add_space(self.theme.spacing_medium);

            ui.add_enabled_ui(!self.workflow.is_busy(), |ui| {
                ui.horizontal_wrapped(|ui| {
                    for ratio in AspectRatio::ALL {
                        ui.selectable_value(&mut self.workflow.aspect_ratio, ratio, ratio.label());
                    }
                });
            });

            let (width, height) = self.workflow.aspect_ratio.canvas_size(max_dimension);
            ui.label(
                egui::RichText::new(format!("Canvas {}x{} px", width, height))
                    .color(self.theme.text_muted),
            );
        });
        ui.add_space(self.theme.spacing_medium);
    }

    fn show_action_buttons(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        self.theme.card_frame().show(ui, |ui| {
            ui.horizontal(|ui| {
                let expand = egui::Button::new(
                    egui::RichText::new("Expand Image")
                        .strong()
                        .color(egui::Color32::WHITE),
                )
                .fill(self.theme.accent)
                .min_size(egui::vec2(130.0, 30.0));
                if ui.add_enabled(self.workflow.can_expand(), expand).clicked() {
                    self.start_expand(ctx);
                }

                if ui
                    .add_enabled(self.workflow.result().is_some(), egui::Button::new("Save…"))
                    .clicked()
                {
                    self.save_result();
                }

                if ui.button("Reset").clicked() {
                    self.reset();
                }
            });
        });
    }

    fn show_status(&mut self, ui: &mut egui::Ui) {
        let stage = self.workflow.stage().clone();
        let color = self.theme.stage_color(&stage);
        ui.horizontal(|ui| {
            match &stage {
                Stage::Empty => {
                    ui.label(egui::RichText::new("Upload or pick an image to begin").color(color));
                }
                Stage::Describing => {
                    ui.spinner();
                    ui.label(egui::RichText::new("Describing image...").color(color));
                }
                Stage::Ready => {
                    ui.label(
                        egui::RichText::new("Ready. Choose an aspect ratio and expand").color(color),
                    );
                }
                Stage::Expanding => {
                    ui.spinner();
                    ui.label(egui::RichText::new("Generating expanded image...").color(color));
                }
                Stage::Expanded => {
                    ui.label(egui::RichText::new("✅ Expanded image ready").color(color));
                }
                Stage::Failed(message) => {
                    ui.label(egui::RichText::new(format!("❌ {}", message)).color(color));
                    if ui.small_button("Dismiss").clicked() {
                        self.workflow.dismiss_error();
                    }
                }
            }
        });
        ui.add_space(self.theme.spacing_large);
    }

    fn show_previews(&self, ui: &mut egui::Ui) {
        let half_width = (ui.available_width() - self.theme.spacing_large) / 2.0;
        let size = egui::vec2(half_width.max(100.0), ui.available_height().max(100.0));

        ui.horizontal_top(|ui| {
            self.show_preview(ui, "Original", self.source_texture.as_ref(), size);
            ui.add_space(self.theme.spacing_large);
            self.show_preview(ui, "Expanded", self.result_texture.as_ref(), size);
        });
    }

    fn show_preview(
        &self,
        ui: &mut egui::Ui,
        title: &str,
        texture: Option<&egui::TextureHandle>,
        size: egui::Vec2,
    ) {
        ui.allocate_ui_with_layout(size, egui::Layout::top_down(egui::Align::Center), |ui| {
            ui.label(
                egui::RichText::new(title)
                    .strong()
                    .color(self.theme.text_secondary),
            );
            ui.add_space(self.theme.spacing_small);
            egui::Frame::none()
                .fill(self.theme.checker)
                .rounding(self.theme.radius_medium)
                .inner_margin(egui::Margin::same(self.theme.spacing_small))
                .show(ui, |ui| match texture {
                    Some(texture) => {
                        ui.add(
                            egui::Image::from_texture(egui::load::SizedTexture::from_handle(texture))
                                .max_size(size - egui::vec2(16.0, 40.0)),
                        );
                    }
                    None => {
                        ui.allocate_ui(egui::vec2(size.x - 16.0, 200.0), |ui| {
                            ui.centered_and_justified(|ui| {
                                ui.label(egui::RichText::new("No image").color(self.theme.text_muted));
                            });
                        });
                    }
                });
        });
    }

    fn show_drive_window(&mut self, ctx: &egui::Context) {
        let mut open = true;
        let mut action: Option<DriveAction> = None;

        egui::Window::new("Google Drive")
            .open(&mut open)
            .default_size(egui::vec2(620.0, 460.0))
            .collapsible(false)
            .show(ctx, |ui| {
                ui.horizontal_wrapped(|ui| {
                    let crumbs = self.navigator.state().breadcrumbs();
                    for (index, crumb) in crumbs.iter().enumerate() {
                        if index > 0 {
                            ui.label(egui::RichText::new("›").color(self.theme.text_muted));
                        }
                        let is_current = index + 1 == crumbs.len();
                        let text = egui::RichText::new(&crumb.name).color(if is_current {
                            self.theme.text_primary
                        } else {
                            self.theme.accent
                        });
                        if ui.add(egui::Button::new(text).frame(false)).clicked() && !is_current {
                            action = Some(DriveAction::Breadcrumb(index));
                        }
                    }

                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("Sign out").clicked() {
                            action = Some(DriveAction::SignOut);
                        }
                        if ui.button("⟳").on_hover_text("Refresh").clicked() {
                            action = Some(DriveAction::Refresh);
                        }
                    });
                });
                ui.separator();

                match self.navigator.status() {
                    ListingStatus::Loading => {
                        ui.horizontal(|ui| {
                            ui.spinner();
                            ui.label(
                                egui::RichText::new("Loading... (complete the Google sign-in in your browser if asked)")
                                    .color(self.theme.text_muted),
                            );
                        });
                    }
                    ListingStatus::Failed(message) => {
                        ui.horizontal(|ui| {
                            ui.label(egui::RichText::new(format!("❌ {}", message)).color(self.theme.error));
                            if ui.button("Retry").clicked() {
                                action = Some(DriveAction::Refresh);
                            }
                        });
                    }
                    ListingStatus::Idle => {}
                }

                if self.navigator.entries().is_empty() && !self.navigator.is_loading() {
                    ui.label(egui::RichText::new("This folder is empty").color(self.theme.text_muted));
                    return;
                }

                TableBuilder::new(ui)
                    .striped(true)
                    .cell_layout(egui::Layout::left_to_right(egui::Align::Center))
                    .column(Column::remainder().at_least(240.0))
                    .column(Column::exact(80.0))
                    .column(Column::exact(140.0))
                    .min_scrolled_height(0.0)
                    .max_scroll_height(360.0)
                    .header(22.0, |mut header| {
                        header.col(|ui| {
                            ui.strong("Name");
                        });
                        header.col(|ui| {
                            ui.strong("Size");
                        });
                        header.col(|ui| {
                            ui.strong("Modified");
                        });
                    })
                    .body(|mut body| {
                        for entry in self.navigator.entries() {
                            body.row(24.0, |mut row| {
                                row.col(|ui| {
                                    let icon = match entry.kind {
                                        EntryKind::Folder => "📁",
                                        EntryKind::Image => "🖼",
                                        EntryKind::Other => "📄",
                                    };
                                    let button = egui::Button::new(format!("{} {}", icon, entry.name))
                                        .frame(false);
                                    let response = ui.add_enabled(entry.kind.is_selectable(), button);
                                    if response.clicked() {
                                        action = Some(DriveAction::Select(entry.clone()));
                                    }
                                });
                                row.col(|ui| {
                                    if !entry.is_folder() {
                                        ui.label(
                                            egui::RichText::new(entry.display_size())
                                                .color(self.theme.text_secondary),
                                        );
                                    }
                                });
                                row.col(|ui| {
                                    if let Some(modified) = entry.modified_time {
                                        ui.label(
                                            egui::RichText::new(
                                                modified.format("%Y-%m-%d %H:%M").to_string(),
                                            )
                                            .color(self.theme.text_muted),
                                        );
                                    }
                                });
                            });
                        }
                    });
            });

        if let Some(action) = action {
            self.apply_drive_action(ctx, action);
        }
        if !open {
            self.show_drive_browser = false;
            self.navigator.reset();
            if let Some(drive) = &self.drive {
                // a sign-in still waiting in the browser is abandoned with the window
                drive.session().cancel_sign_in();
            }
        }
    }

    fn show_logs_panel(&mut self, ui: &mut egui::Ui) {
        ui.add_space(self.theme.spacing_small);
        ui.label(
            egui::RichText::new("Activity")
                .strong()
                .color(self.theme.text_secondary),
        );
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &self.logs {
                    ui.label(
                        egui::RichText::new(line)
                            .font(self.theme.font_small.clone())
                            .color(self.theme.text_secondary),
                    );
                }
                if self.should_scroll_logs_to_bottom {
                    ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                }
            });
        self.should_scroll_logs_to_bottom = false;
    }
}

/// Decodes `bytes` into a preview texture no larger than [`PREVIEW_SIZE`].
fn load_texture(ctx: &egui::Context, name: &str, bytes: &[u8]) -> Option<egui::TextureHandle> {
    let image = match image::load_from_memory(bytes) {
        Ok(image) => image,
        Err(e) => {
            log::warn!("Cannot preview {}: {}", name, e);
            return None;
        }
    };
    let preview = if image.width() > PREVIEW_SIZE || image.height() > PREVIEW_SIZE {
        image.thumbnail(PREVIEW_SIZE, PREVIEW_SIZE)
    } else {
        image
    };
    let rgba = preview.to_rgba8();
    let color_image = egui::ColorImage::from_rgba_unmultiplied(
        [rgba.width() as usize, rgba.height() as usize],
        rgba.as_raw(),
    );
    Some(ctx.load_texture(name, color_image, egui::TextureOptions::LINEAR))
}
