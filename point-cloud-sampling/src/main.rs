/// Point cloud sampling entry point
use point_cloud_sampling::SamplingConfig;
use point_cloud_sampling::pipeline::SamplingPipeline;
use std::env;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if !(2..=3).contains(&args.len()) {
        eprintln!("Usage: {} <input.laz> [config.json]", args[0]);
        std::process::exit(1);
    }

    let config = match args.get(2) {
        Some(path) => SamplingConfig::from_json_file(Path::new(path))?,
        None => SamplingConfig::default(),
    };

    let pipeline = SamplingPipeline::new(Path::new(&args[1]), config)?;
    pipeline.run()?;

    Ok(())
}
