use anyhow::{bail, Context, Result};
use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::thread::sleep;
use std::time::Duration;

// Stand-in external tool driven by command-line flags. Flags it does not
// recognize are accepted silently so tests can pass through arbitrary
// payload arguments.
fn main() -> Result<()> {
    let argv: Vec<String> = env::args().skip(1).collect();
    let config = Config::parse(&argv)?;

    let run_count = match config.count_file {
        Some(ref path) => Some(record_run(path)?),
        None => None,
    };

    if config.print_args {
        for arg in &argv {
            println!("{}", arg);
        }
    }
    for key in &config.print_env {
        match env::var(key) {
            Ok(value) => println!("{}={}", key, value),
            Err(_) => println!("{} is unset", key),
        }
    }
    if config.print_cwd {
        println!("cwd={}", env::current_dir()?.display());
    }
    if let Some(ref text) = config.stdout_text {
        println!("{}", text);
    }
    if let Some(ref text) = config.stderr_text {
        eprintln!("{}", text);
    }
    if let Some(ms) = config.sleep_ms {
        sleep(Duration::from_millis(ms));
    }

    if let (Some(threshold), Some(count)) = (config.fail_until, run_count) {
        if count < threshold {
            exit(1);
        }
    }
    if let Some(code) = config.exit_code {
        exit(code);
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Config {
    print_args: bool,
    print_env: Vec<String>,
    print_cwd: bool,
    stdout_text: Option<String>,
    stderr_text: Option<String>,
    sleep_ms: Option<u64>,
    exit_code: Option<i32>,
    count_file: Option<PathBuf>,
    fail_until: Option<u64>,
}

impl Config {
    fn parse(argv: &[String]) -> Result<Self> {
        let mut config = Config::default();
        let mut iter = argv.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--print-args" => config.print_args = true,
                "--print-env" => {
                    let key = iter.next().context("--print-env needs a variable name")?;
                    config.print_env.push(key.clone());
                }
                "--print-cwd" => config.print_cwd = true,
                "--stdout" => {
                    config.stdout_text = Some(iter.next().context("--stdout needs text")?.clone());
                }
                "--stderr" => {
                    config.stderr_text = Some(iter.next().context("--stderr needs text")?.clone());
                }
                "--sleep-ms" => {
                    let raw = iter.next().context("--sleep-ms needs a value")?;
                    config.sleep_ms =
                        Some(raw.parse().context("--sleep-ms value must be an integer")?);
                }
                "--exit-code" => {
                    let raw = iter.next().context("--exit-code needs a value")?;
                    config.exit_code =
                        Some(raw.parse().context("--exit-code value must be an integer")?);
                }
                "--count-file" => {
                    config.count_file =
                        Some(PathBuf::from(iter.next().context("--count-file needs a path")?));
                }
                "--fail-until" => {
                    let raw = iter.next().context("--fail-until needs a value")?;
                    config.fail_until =
                        Some(raw.parse().context("--fail-until value must be an integer")?);
                }
                _ => {}
            }
        }
        if config.fail_until.is_some() && config.count_file.is_none() {
            bail!("--fail-until requires --count-file");
        }
        Ok(config)
    }
}

fn record_run(path: &Path) -> Result<u64> {
    // Count-then-append is racy across processes, but each test uses its
    // own file and attempts run sequentially.
    let previous = std::fs::read_to_string(path)
        .map(|content| content.lines().count() as u64)
        .unwrap_or(0);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    writeln!(file, "run")?;
    Ok(previous + 1)
}
