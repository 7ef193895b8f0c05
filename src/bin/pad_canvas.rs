//! Pads an image onto a transparent canvas of the given aspect ratio.
//!
//! Usage: `pad_canvas <input> <output.png> [ratio] [max_dimension]`

use outpaint_studio::compositor::{self, AspectRatio, DEFAULT_MAX_DIMENSION, MAX_CANVAS_DIMENSION};
use std::{env, fs, process};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("usage: pad_canvas <input> <output.png> [1:1|16:9|9:16|4:3|3:4] [max_dimension]");
        process::exit(2);
    }

    if let Err(e) = run(&args) {
        eprintln!("❌ {}", e);
        process::exit(1);
    }
}

fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let (input_path, output_path) = (&args[0], &args[1]);
    let ratio: AspectRatio = match args.get(2) {
        Some(label) => label.parse()?,
        None => AspectRatio::default(),
    };
    let max_dimension: u32 = match args.get(3) {
        Some(value) => value.parse()?,
        None => DEFAULT_MAX_DIMENSION,
    };
    if max_dimension == 0 || max_dimension > MAX_CANVAS_DIMENSION {
        return Err(format!("max_dimension must be between 1 and {}", MAX_CANVAS_DIMENSION).into());
    }

    let bytes = fs::read(input_path)?;
    let composed = compositor::compose_png(&bytes, ratio, max_dimension)?;
    fs::write(output_path, &composed.png)?;

    let plan = composed.plan;
    println!(
        "Created {}x{} canvas at {} (image {:.0}x{:.0} at {:.0},{:.0})",
        plan.canvas_width,
        plan.canvas_height,
        output_path,
        plan.draw_width,
        plan.draw_height,
        plan.draw_x,
        plan.draw_y
    );
    Ok(())
}
