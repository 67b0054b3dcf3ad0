use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use clap::Parser;
use colored::Colorize;
use eyre::{bail, Result, WrapErr};
use leakscope::inject::{instrument_source, instrumented_path, InjectOutcome};

const OUTPUT_BINARY: &str = "profiled_program";

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "leakscope: instrument a Rust program with heap profiling, build it,\nrun it, and collect a console summary plus an HTML leak report.\n\nhttps://github.com/pawurb/leakscope"
)]
pub struct ProfileArgs {
    /// Rust source file to analyze
    pub target: PathBuf,

    /// Directory containing the compiled leakscope rlib and its deps/
    #[arg(long, default_value = "target/debug")]
    pub lib_dir: PathBuf,

    /// Rust edition passed to rustc
    #[arg(long, default_value = "2021")]
    pub edition: String,

    /// Keep the instrumented copy instead of deleting it after the run
    #[arg(long)]
    pub keep: bool,

    /// Kill the profiled program if it runs longer than this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Also write memory_report.json next to the HTML report
    #[arg(long)]
    pub json: bool,
}

impl ProfileArgs {
    pub fn run(&self) -> Result<()> {
        banner();

        let source = fs::read_to_string(&self.target).wrap_err_with(|| {
            format!(
                "target source `{}` not found or unreadable",
                self.target.display()
            )
        })?;

        println!(
            "{} instrumenting {}",
            "[leakscope]".blue().bold(),
            self.target.display()
        );

        let (build_path, fresh_copy) = match instrument_source(&source)? {
            InjectOutcome::Instrumented(rewritten) => {
                let path = instrumented_path(&self.target);
                fs::write(&path, rewritten)
                    .wrap_err_with(|| format!("failed to write `{}`", path.display()))?;
                (path, true)
            }
            InjectOutcome::AlreadyInstrumented => {
                println!(
                    "{} target is already instrumented, building it as-is",
                    "[leakscope]".yellow().bold()
                );
                (self.target.clone(), false)
            }
        };

        // On compile failure the instrumented copy is deliberately left on
        // disk so the diagnostics can be matched against it.
        self.compile(&build_path)?;

        println!(
            "{} running ./{}",
            "[leakscope]".blue().bold(),
            OUTPUT_BINARY
        );
        let status = self.run_target()?;
        println!(
            "{} profiled program exited with {}",
            "[leakscope]".blue().bold(),
            status
        );

        if fresh_copy && !self.keep {
            let _ = fs::remove_file(&build_path);
        }

        println!();
        println!("To view the detailed report, run:");
        println!("  open {}      (macOS)", leakscope::HTML_REPORT_FILENAME);
        println!("  xdg-open {}  (Linux)", leakscope::HTML_REPORT_FILENAME);
        Ok(())
    }

    fn compile(&self, path: &Path) -> Result<()> {
        println!(
            "{} compiling {}",
            "[leakscope]".blue().bold(),
            path.display()
        );

        let rlib = self.lib_dir.join("libleakscope.rlib");
        let deps = self.lib_dir.join("deps");
        let status = Command::new("rustc")
            .arg("--edition")
            .arg(&self.edition)
            .arg(path)
            .arg("-o")
            .arg(OUTPUT_BINARY)
            .arg("--extern")
            .arg(format!("leakscope={}", rlib.display()))
            .arg("-L")
            .arg(format!("dependency={}", deps.display()))
            .status()
            .wrap_err("failed to spawn rustc")?;

        if !status.success() {
            bail!(
                "compilation failed; instrumented file kept at `{}` for inspection",
                path.display()
            );
        }
        Ok(())
    }

    /// Runs the compiled target with inherited stdio. The exit status is
    /// reported but not acted on: the reports were written before the
    /// target's entry function returned.
    fn run_target(&self) -> Result<ExitStatus> {
        let program = Path::new(".").join(OUTPUT_BINARY);
        let mut command = Command::new(&program);
        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if self.json {
            command.env(leakscope::JSON_REPORT_ENV, "1");
        }

        let mut child = command
            .spawn()
            .wrap_err_with(|| format!("failed to launch `{}`", program.display()))?;

        let Some(secs) = self.timeout else {
            return child.wait().wrap_err("failed to wait for profiled program");
        };

        let deadline = Instant::now() + Duration::from_secs(secs);
        loop {
            if let Some(status) = child
                .try_wait()
                .wrap_err("failed to poll profiled program")?
            {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                println!(
                    "{} profiled program exceeded {}s timeout, killing it",
                    "[leakscope]".red().bold(),
                    secs
                );
                child.kill().ok();
                return child.wait().wrap_err("failed to reap profiled program");
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

fn banner() {
    println!();
    println!("============================================================");
    println!("        LEAKSCOPE - MEMORY PROFILER & LEAK DETECTOR");
    println!("             Analyze Memory Usage & Find Leaks");
    println!("============================================================");
    println!();
}
