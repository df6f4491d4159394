//! Classify image files without watching or modifying anything.

use std::path::PathBuf;

use defectwatch::classifier::{Classifier, Polarity};
use defectwatch::config::{self, ModelSettings};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    model_path: Option<PathBuf>,
    polarity: Option<Polarity>,
    demo: bool,
    files: Vec<PathBuf>,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let settings = config::load_or_default().map_err(|err| err.to_string())?;
    let polarity = options.polarity.unwrap_or(settings.pipeline.polarity);
    let classifier = if options.demo {
        Classifier::demo(polarity)
    } else {
        let model = ModelSettings {
            path: options.model_path.or(settings.model.path),
        };
        Classifier::from_settings(&model, polarity)
    };

    let mut errors = 0usize;
    for file in &options.files {
        let verdict = classifier.classify_file(file);
        if verdict.is_error() {
            errors += 1;
        }
        println!("{}\t{verdict}", file.display());
    }
    if errors > 0 {
        return Err(format!("{errors} file(s) could not be classified"));
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut model_path: Option<PathBuf> = None;
    let mut polarity: Option<Polarity> = None;
    let mut demo = false;
    let mut files = Vec::new();

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--model" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--model requires a value".to_string())?;
                model_path = Some(PathBuf::from(value));
            }
            "--polarity" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--polarity requires a value".to_string())?;
                polarity = Some(value.parse::<Polarity>()?);
            }
            "--demo" => demo = true,
            flag if flag.starts_with("--") => {
                return Err(format!("Unknown argument: {flag}\n\n{}", help_text()));
            }
            file => files.push(PathBuf::from(file)),
        }
        idx += 1;
    }
    if files.is_empty() {
        return Err(format!("No image files given\n\n{}", help_text()));
    }
    Ok(CliOptions {
        model_path,
        polarity,
        demo,
        files,
    })
}

fn help_text() -> String {
    [
        "defectwatch-classify",
        "",
        "Print the defect verdict for each image. Files are never modified.",
        "",
        "Usage:",
        "  defectwatch-classify [--model <model.json>] [--polarity <p>] [--demo] <image>...",
        "",
        "Options:",
        "  --model <path>     Model file (defaults to [model] path in config.toml).",
        "  --polarity <p>     defect_probability or not_defect_probability.",
        "  --demo             Use the deterministic demo classifier.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parses_model_polarity_and_files() {
        let options = parse_args(args(&[
            "--model",
            "m.json",
            "--polarity",
            "not-defect-probability",
            "a.jpg",
            "b.png",
        ]))
        .unwrap();
        assert_eq!(options.model_path, Some(PathBuf::from("m.json")));
        assert_eq!(options.polarity, Some(Polarity::NotDefectProbability));
        assert_eq!(options.files.len(), 2);
        assert!(!options.demo);
    }

    #[test]
    fn rejects_missing_files_and_bad_polarity() {
        assert!(parse_args(args(&["--demo"])).is_err());
        assert!(parse_args(args(&["--polarity", "sideways", "a.jpg"])).is_err());
        assert!(parse_args(args(&["--model"])).is_err());
    }
}
