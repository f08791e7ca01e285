use std::io::Read;
use std::path::Path;
use std::time::Instant;

use piper_synth::{
    engines::piper::PiperEngine, OutputTarget, PiperSynthesizer, SynthesisParameters,
    SynthesizerConfigBuilder,
};

/// Usage: synthesize <voice> [output.wav | -] [output_dir]
///
/// Reads text from stdin. `voice` may be a model path, catalog key or alias.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let voice = args.next().unwrap_or_else(|| "en_US-lessac-medium".to_string());
    let output_file = args.next();
    let output_dir = args.next();

    let config = SynthesizerConfigBuilder::default()
        .model(voice)
        .data_dir("voices")
        .debug(std::env::var_os("PIPER_DEBUG").is_some())
        .build()?;

    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .init();

    let load_start = Instant::now();
    let mut synth = PiperSynthesizer::new(&config, PiperEngine::new())?;
    eprintln!("Voice loaded in {:.2?}", load_start.elapsed());

    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;

    let target = OutputTarget::from_options(output_file.as_deref(), output_dir.as_deref().map(Path::new));
    let params = SynthesisParameters {
        sentence_silence: 0.2,
        ..Default::default()
    };

    let synth_start = Instant::now();
    let written = synth.synthesize_speech(&text, &target, &params)?;
    eprintln!("Synthesized in {:.2?}", synth_start.elapsed());

    if let Some(path) = written {
        println!("{}", path.display());
    }
    Ok(())
}
