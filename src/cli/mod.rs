mod exec;
mod host;
mod script_cmd;

use anyhow::Result;
use console::style;
use std::path::PathBuf;
use tracing::Level;

use clipscript::core::config::EngineConfig;
use clipscript::core::script::trigger;
use clipscript::core::terminal::{self, GuideSection, print_error};
use clipscript::logging::{TeeMakeWriter, init_logging};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Scripts")
        .command("run <file>", "Run a script against an ad-hoc clipboard item")
        .command("match", "Check keyword and content-type rules against text")
        .command("imports <file>", "Show granted capabilities and sanitized source")
        .print();

    GuideSection::new("Engine")
        .command("exec", "Run the scripts of a stored item through the executor")
        .command("listen", "Read execution requests as JSON lines from stdin")
        .print();

    GuideSection::new("Global options")
        .text("--config <path>   Engine config (default: <config dir>/clipscript/engine.toml)")
        .text("--verbose, -v     Debug logging")
        .text("--quiet, -q       Warnings and errors only")
        .blank()
        .hint("clipscript run upper.rhai --content \"hello\"", "")
        .hint("clipscript match --content \"https://x.io\" --keyword \"/^https?:/i\"", "")
        .hint("clipscript exec --db clipboard.db --item 42", "")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("clipscript").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct GlobalFlags {
    pub config: Option<PathBuf>,
    pub verbose: bool,
    pub quiet: bool,
}

impl GlobalFlags {
    fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::WARN
        } else {
            Level::INFO
        }
    }
}

/// Pull global flags out of `args`, returning them and the remaining args.
pub(crate) fn parse_global_flags(args: &[String]) -> (GlobalFlags, Vec<String>) {
    let mut flags = GlobalFlags::default();
    let mut rest = Vec::with_capacity(args.len());
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 < args.len() {
                    flags.config = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                flags.verbose = true;
                i += 1;
            }
            "--quiet" | "-q" => {
                flags.quiet = true;
                i += 1;
            }
            _ => {
                rest.push(args[i].clone());
                i += 1;
            }
        }
    }
    (flags, rest)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunArgs {
    pub file: Option<PathBuf>,
    pub content: String,
    pub content_type: String,
    pub source: String,
}

pub(crate) fn parse_run_args(args: &[String], start: usize) -> RunArgs {
    let mut parsed = RunArgs {
        file: None,
        content: String::new(),
        content_type: "Text".to_string(),
        source: String::new(),
    };
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--content" | "-c" => {
                if i + 1 < args.len() {
                    parsed.content = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--type" | "-t" => {
                if i + 1 < args.len() {
                    parsed.content_type = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--source" => {
                if i + 1 < args.len() {
                    parsed.source = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            other => {
                if parsed.file.is_none() && !other.starts_with('-') {
                    parsed.file = Some(PathBuf::from(other));
                }
                i += 1;
            }
        }
    }
    parsed
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MatchArgs {
    pub content: String,
    pub content_type: String,
    pub keywords: Vec<String>,
    pub content_types: Vec<String>,
}

pub(crate) fn parse_match_args(args: &[String], start: usize) -> MatchArgs {
    let mut parsed = MatchArgs {
        content: String::new(),
        content_type: "Text".to_string(),
        keywords: Vec::new(),
        content_types: Vec::new(),
    };
    let mut i = start;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match (args[i].as_str(), value) {
            ("--content" | "-c", Some(v)) => parsed.content = v,
            ("--type" | "-t", Some(v)) => parsed.content_type = v,
            ("--keyword" | "-k", Some(v)) => parsed.keywords.push(v),
            ("--content-type", Some(v)) => parsed.content_types.push(v),
            _ => {
                i += 1;
                continue;
            }
        }
        i += 2;
    }
    parsed
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExecArgs {
    pub db: Option<PathBuf>,
    pub item: Option<String>,
    pub trigger: String,
    pub script_ids: Vec<String>,
}

pub(crate) fn parse_exec_args(args: &[String], start: usize) -> ExecArgs {
    let mut parsed = ExecArgs {
        db: None,
        item: None,
        trigger: trigger::AFTER_SAVE.to_string(),
        script_ids: Vec::new(),
    };
    let mut i = start;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match (args[i].as_str(), value) {
            ("--db", Some(v)) => parsed.db = Some(PathBuf::from(v)),
            ("--item" | "-i", Some(v)) => parsed.item = Some(v),
            ("--trigger", Some(v)) => parsed.trigger = v,
            ("--script" | "-s", Some(v)) => parsed.script_ids.push(v),
            _ => {
                i += 1;
                continue;
            }
        }
        i += 2;
    }
    parsed
}

async fn load_config(flags: &GlobalFlags) -> Result<EngineConfig> {
    match flags.config.clone().or_else(EngineConfig::default_path) {
        Some(path) => EngineConfig::load(path).await,
        None => Ok(EngineConfig::default()),
    }
}

pub async fn run_main() -> Result<()> {
    let raw: Vec<String> = std::env::args().collect();
    let (flags, args) = parse_global_flags(&raw);

    let cmd = args.get(1).map(String::as_str).unwrap_or("");

    // `listen` interleaves log lines with events on stdout.
    let log_tx = if cmd == "listen" {
        Some(tokio::sync::broadcast::channel::<String>(500).0)
    } else {
        None
    };
    init_logging(
        flags.log_level(),
        TeeMakeWriter {
            sender: log_tx.clone(),
            suppress_stderr: log_tx.is_some(),
        },
    );

    match cmd {
        "run" => {
            let parsed = parse_run_args(&args, 2);
            let Some(file) = parsed.file.clone() else {
                print_error("Error: a script file is required for run.");
                print_help();
                return Ok(());
            };
            let config = load_config(&flags).await?;
            script_cmd::run_script(&file, &parsed, &config).await
        }
        "match" => {
            let parsed = parse_match_args(&args, 2);
            script_cmd::run_match(&parsed);
            Ok(())
        }
        "imports" => {
            let Some(file) = args.get(2) else {
                print_error("Error: a script file is required for imports.");
                return Ok(());
            };
            script_cmd::run_imports(&PathBuf::from(file)).await
        }
        "exec" => {
            let parsed = parse_exec_args(&args, 2);
            let (Some(db), Some(item)) = (parsed.db.clone(), parsed.item.clone()) else {
                print_error("Error: --db and --item are required for exec.");
                print_help();
                return Ok(());
            };
            let config = load_config(&flags).await?;
            exec::run_exec(&db, &item, &parsed, &config).await
        }
        "listen" => {
            let parsed = parse_exec_args(&args, 2);
            let Some(db) = parsed.db else {
                print_error("Error: --db is required for listen.");
                return Ok(());
            };
            let config = load_config(&flags).await?;
            exec::run_listen(&db, &config, log_tx).await
        }
        "help" | "--help" | "-h" | "" => {
            print_help();
            Ok(())
        }
        other => {
            print_error(&format!("Unknown command: {}", other));
            print_help();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_exec_args, parse_global_flags, parse_match_args, parse_run_args};
    use std::path::PathBuf;
    use tracing::Level;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn global_flags_are_stripped_anywhere() {
        let (flags, rest) = parse_global_flags(&args(&[
            "clipscript",
            "-v",
            "run",
            "a.rhai",
            "--config",
            "/tmp/engine.toml",
        ]));
        assert!(flags.verbose);
        assert_eq!(flags.config, Some(PathBuf::from("/tmp/engine.toml")));
        assert_eq!(flags.log_level(), Level::DEBUG);
        assert_eq!(rest, args(&["clipscript", "run", "a.rhai"]));
    }

    #[test]
    fn quiet_lowers_log_level() {
        let (flags, _) = parse_global_flags(&args(&["clipscript", "--quiet"]));
        assert_eq!(flags.log_level(), Level::WARN);
    }

    #[test]
    fn parse_run_args_reads_file_and_item_fields() {
        let parsed = parse_run_args(
            &args(&[
                "clipscript",
                "run",
                "--content",
                "hello",
                "upper.rhai",
                "--type",
                "URL",
                "--source",
                "Safari",
            ]),
            2,
        );
        assert_eq!(parsed.file, Some(PathBuf::from("upper.rhai")));
        assert_eq!(parsed.content, "hello");
        assert_eq!(parsed.content_type, "URL");
        assert_eq!(parsed.source, "Safari");
    }

    #[test]
    fn parse_match_args_collects_repeated_flags() {
        let parsed = parse_match_args(
            &args(&[
                "clipscript",
                "match",
                "-c",
                "xBARx",
                "-k",
                "foo",
                "--keyword",
                "/bar/i",
                "--content-type",
                "Text",
                "--dangling",
            ]),
            2,
        );
        assert_eq!(parsed.content, "xBARx");
        assert_eq!(parsed.keywords, vec!["foo", "/bar/i"]);
        assert_eq!(parsed.content_types, vec!["Text"]);
        assert_eq!(parsed.content_type, "Text");
    }

    #[test]
    fn parse_exec_args_defaults_to_after_save() {
        let parsed = parse_exec_args(
            &args(&["clipscript", "exec", "--db", "c.db", "--item", "42", "-s", "a"]),
            2,
        );
        assert_eq!(parsed.db, Some(PathBuf::from("c.db")));
        assert_eq!(parsed.item.as_deref(), Some("42"));
        assert_eq!(parsed.trigger, "after_save");
        assert_eq!(parsed.script_ids, vec!["a"]);

        let missing_value = parse_exec_args(&args(&["clipscript", "exec", "--item"]), 2);
        assert_eq!(missing_value.item, None);
    }
}
