// SPDX-License-Identifier: MPL-2.0
use pixel_magic::app::{logging, paths, storage, App};
use pixel_magic::application::port::ModelKind;
use pixel_magic::config::{self, DevicePreference, Overrides, Settings};
use pixel_magic::error::Result;
use std::path::PathBuf;
use std::process::ExitCode;

const HELP: &str = "\
pixel_magic: apply pretrained image models to your pictures

USAGE:
  pixel_magic [OPTIONS] <COMMAND>

COMMANDS:
  apply <MODEL> <IMAGE>   Run a model on an image and store the result
  history                 List stored results grouped by day
  fetch <MODEL>           Download the files a model needs
  device                  Print the device inference runs on

MODELS:
  rmbg                    Remove the background (alias: remove-background)
  super-resolution        Upscale 4x (alias: sr)

OPTIONS:
  -h, --help              Print this help
      --data-dir <PATH>   Override the data directory (models and results)
      --config-dir <PATH> Override the directory holding settings.toml
      --steps <N>         Super-resolution denoising steps (1..=1000)
      --device <DEVICE>   auto, cpu or cuda

ENVIRONMENT:
  SUPER_RESOLUTION_STEPS  Default step count when --steps is absent
  PIXEL_MAGIC_DATA_DIR    Data directory override
  PIXEL_MAGIC_CONFIG_DIR  Config directory override
  RUST_LOG                Log filter (default: pixel_magic=info)
";

#[derive(Debug, PartialEq)]
enum Command {
    Apply { kind: ModelKind, image: PathBuf },
    History,
    Fetch { kind: ModelKind },
    Device,
    Help,
}

#[derive(Debug)]
struct Args {
    command: Command,
    data_dir: Option<String>,
    config_dir: Option<String>,
    overrides: Overrides,
}

fn parse_args(mut args: pico_args::Arguments) -> std::result::Result<Args, String> {
    let help = args.contains(["-h", "--help"]);
    let data_dir = args.opt_value_from_str("--data-dir").map_err(|e| e.to_string())?;
    let config_dir = args.opt_value_from_str("--config-dir").map_err(|e| e.to_string())?;
    let steps: Option<usize> = args.opt_value_from_str("--steps").map_err(|e| e.to_string())?;
    let device: Option<DevicePreference> =
        args.opt_value_from_str("--device").map_err(|e| e.to_string())?;

    let overrides = Overrides {
        super_resolution_steps: steps,
        device,
    };

    if help {
        return Ok(Args {
            command: Command::Help,
            data_dir,
            config_dir,
            overrides,
        });
    }

    let command = match args.subcommand().map_err(|e| e.to_string())?.as_deref() {
        Some("apply") => Command::Apply {
            kind: args.free_from_str().map_err(|e| e.to_string())?,
            image: args.free_from_str().map_err(|e| e.to_string())?,
        },
        Some("history") => Command::History,
        Some("fetch") => Command::Fetch {
            kind: args.free_from_str().map_err(|e| e.to_string())?,
        },
        Some("device") => Command::Device,
        Some(other) => return Err(format!("unknown command '{other}'")),
        None => Command::Help,
    };

    let remaining = args.finish();
    if !remaining.is_empty() {
        return Err(format!("unexpected arguments: {remaining:?}"));
    }

    Ok(Args {
        command,
        data_dir,
        config_dir,
        overrides,
    })
}

fn main() -> ExitCode {
    let args = match parse_args(pico_args::Arguments::from_env()) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("error: {err}\n\n{HELP}");
            return ExitCode::from(2);
        }
    };

    if args.command == Command::Help {
        print!("{HELP}");
        return ExitCode::SUCCESS;
    }

    logging::init();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    paths::init_cli_overrides(args.data_dir, args.config_dir);
    let config = config::load()?;
    let settings = Settings::resolve(&config, &args.overrides);
    let app = App::new(settings, &paths::data_dir_or_cwd())?;

    match args.command {
        Command::Apply { kind, image } => {
            let stored = runtime()?.block_on(app.apply(&image, kind, download_progress()))?;
            if let Some(stored) = stored {
                println!("{}", stored.path.display());
            }
        }
        Command::History => print_history(&app)?,
        Command::Fetch { kind } => {
            runtime()?.block_on(app.fetch(kind, download_progress()))?;
            println!("{}", app.model_source(kind).directory().display());
        }
        Command::Device => println!("{}", app.device()),
        Command::Help => print!("{HELP}"),
    }

    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

/// Logs download progress once per started tenth.
fn download_progress() -> impl FnMut(&str, f32) + Send {
    let mut last_decile = None;
    move |file: &str, progress: f32| {
        // Progress is a 0.0..=1.0 fraction, so this stays within 0..=10
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let decile = (progress * 10.0) as u8;
        if last_decile != Some(decile) {
            last_decile = Some(decile);
            tracing::info!(file, percent = u32::from(decile) * 10, "downloading");
        }
    }
}

fn print_history(app: &App) -> Result<()> {
    let history = app.studio().history()?;
    if history.is_empty() {
        println!("No stored images yet.");
        return Ok(());
    }

    let storage = app.studio().storage();
    for (day, names) in history.iter().rev() {
        println!("{day}");
        for name in names {
            println!(
                "  {}  {}",
                storage::display_name(name),
                storage.path_of(name).display()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn parse(args: &[&str]) -> std::result::Result<Args, String> {
        parse_args(pico_args::Arguments::from_vec(
            args.iter().map(OsString::from).collect(),
        ))
    }

    #[test]
    fn apply_takes_model_and_image() {
        let args = parse(&["--steps", "20", "apply", "sr", "photo.jpg"]).unwrap();
        assert_eq!(
            args.command,
            Command::Apply {
                kind: ModelKind::SuperResolution,
                image: PathBuf::from("photo.jpg"),
            }
        );
        assert_eq!(args.overrides.super_resolution_steps, Some(20));
    }

    #[test]
    fn global_options_are_collected() {
        let args = parse(&["history", "--data-dir", "/tmp/pm", "--device", "cpu"]).unwrap();
        assert_eq!(args.command, Command::History);
        assert_eq!(args.data_dir.as_deref(), Some("/tmp/pm"));
        assert_eq!(args.overrides.device, Some(DevicePreference::Cpu));
    }

    #[test]
    fn no_command_shows_help() {
        assert_eq!(parse(&[]).unwrap().command, Command::Help);
        assert_eq!(parse(&["device", "-h"]).unwrap().command, Command::Help);
    }

    #[test]
    fn bad_input_is_rejected() {
        assert!(parse(&["transmogrify"]).is_err());
        assert!(parse(&["fetch", "deblur"]).is_err());
        assert!(parse(&["apply", "rmbg"]).is_err());
        assert!(parse(&["device", "extra"]).is_err());
        assert!(parse(&["--steps", "many", "device"]).is_err());
    }
}
