//! Offline render demo: writes the stub test tone to a WAV file.
//!
//! Exercises the synth seam and the WAV output path end-to-end without audio
//! hardware.

fn main() {
    if let Err(e) = run() {
        eprintln!("render failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    use cadenza_core::output::wav::render_to_wav;
    use cadenza_core::{EngineConfig, SineSynth, SynthHandle};
    use std::path::PathBuf;

    struct Args {
        output: PathBuf,
        seconds: f64,
        freq: f32,
    }

    fn parse_args() -> Result<Args, String> {
        let mut output: Option<PathBuf> = None;
        let mut seconds: f64 = 2.0;
        let mut freq: f32 = 440.0;

        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--output" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --output".into());
                    };
                    output = Some(PathBuf::from(v));
                }
                "--seconds" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --seconds".into());
                    };
                    seconds = v
                        .parse::<f64>()
                        .map_err(|_| "invalid value for --seconds".to_string())?
                        .clamp(0.1, 600.0);
                }
                "--freq" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --freq".into());
                    };
                    freq = v
                        .parse::<f32>()
                        .map_err(|_| "invalid value for --freq".to_string())?;
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: cargo run -p cadenza-core --bin render -- \\
  [--output <file.wav>] [--seconds <n>] [--freq <hz>]"
                    );
                    std::process::exit(0);
                }
                other => {
                    return Err(format!("unknown argument: {other}"));
                }
            }
        }

        Ok(Args {
            output: output.unwrap_or_else(|| PathBuf::from("tone.wav")),
            seconds,
            freq,
        })
    }

    let args = parse_args()?;
    let config = EngineConfig::default();
    let total_samples = (args.seconds * f64::from(config.sample_rate)) as u64;

    let synth = SynthHandle::new(SineSynth::new(config.sample_rate, args.freq, total_samples));

    let written =
        render_to_wav(&synth, &args.output, &config).map_err(|e| e.to_string())?;

    println!(
        "wrote {} samples/channel ({:.2} s at {} Hz) to {}",
        written,
        written as f64 / f64::from(config.sample_rate),
        config.sample_rate,
        args.output.display()
    );

    Ok(())
}
