// crates/cli/src/output.rs
//! Terminal rendering: an indicatif bar for people, JSON lines for scripts.

use std::process::ExitCode;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use datadict_jobs::{ImportJob, TrackerEvent};

/// Exit status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Completed, or nothing to do.
    Success,
    /// Failed, cancelled or timed out.
    Unsuccessful,
    /// Usage or authentication problem.
    Usage,
}

impl Outcome {
    /// Outcome of a watch that ended with `event`.
    pub fn of(event: &TrackerEvent) -> Self {
        match event {
            TrackerEvent::Completed { .. } | TrackerEvent::ContinuesInBackground { .. } => {
                Outcome::Success
            }
            _ => Outcome::Unsuccessful,
        }
    }
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::Unsuccessful => ExitCode::from(1),
            Outcome::Usage => ExitCode::from(2),
        }
    }
}

pub struct Reporter {
    json: bool,
    bar: Option<ProgressBar>,
}

impl Reporter {
    pub fn new(json: bool) -> Self {
        Self { json, bar: None }
    }

    pub fn event(&mut self, event: &TrackerEvent) {
        if self.json {
            print_json(event);
            return;
        }

        match event {
            TrackerEvent::Adopted { job, .. } => {
                eprintln!("  {}", event.message());
                self.show_progress(job);
            }
            TrackerEvent::Progress { job } => self.show_progress(job),
            TrackerEvent::StaleWarning { .. } | TrackerEvent::StaleCleared { .. } => {
                self.note(&format!("  ! {}", event.message()));
            }
            TrackerEvent::Completed { job, .. } => {
                self.show_progress(job);
                self.finish(&format!("  \u{2713} {}", event.message()));
            }
            _ if event.ends_watch() => self.finish(&format!("  \u{2717} {}", event.message())),
            _ => self.note(&format!("  {}", event.message())),
        }
    }

    /// Stop rendering without a terminal event (Ctrl-C).
    pub fn detach(&mut self, job: Option<&ImportJob>) {
        let line = match job {
            Some(job) => format!(
                "  Stopped watching import job {}; it continues in the background",
                job.id
            ),
            None => "  Stopped watching".to_string(),
        };
        self.finish(&line);
    }

    pub fn job(&self, job: &ImportJob) {
        if self.json {
            print_json(job);
        } else {
            println!("{}", job_line(job));
            if let Some(error) = &job.error_message {
                println!("    error: {error}");
            }
            if !job.failed_tables.is_empty() {
                println!("    failed tables: {}", job.failed_tables.join(", "));
            }
        }
    }

    pub fn jobs(&self, jobs: &[ImportJob]) {
        if self.json {
            print_json(&jobs);
            return;
        }
        if jobs.is_empty() {
            println!("no active import jobs");
        }
        for job in jobs {
            println!("{}", job_line(job));
        }
    }

    pub fn message(&self, text: &str) {
        if self.json {
            print_json(&serde_json::json!({ "type": "message", "message": text }));
        } else {
            println!("{text}");
        }
    }

    fn show_progress(&mut self, job: &ImportJob) {
        let bar = self.bar.get_or_insert_with(|| {
            let bar = ProgressBar::new(u64::from(job.total_tables));
            if let Ok(style) = ProgressStyle::default_bar()
                .template("  {spinner} [{bar:30}] {pos}/{len} tables {msg}")
            {
                bar.set_style(style.progress_chars("=> "));
            }
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        bar.set_length(u64::from(job.total_tables));
        bar.set_position(u64::from(job.imported_tables));
        if job.failed_tables.is_empty() {
            bar.set_message(job.status.to_string());
        } else {
            bar.set_message(format!("{} ({} failed)", job.status, job.failed_tables.len()));
        }
    }

    fn note(&self, line: &str) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }

    fn finish(&mut self, line: &str) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        eprintln!("{line}");
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::error!(error = %e, "failed to serialize output"),
    }
}

pub fn job_line(job: &ImportJob) -> String {
    format!(
        "{}  {:<11}  {}/{} tables  created {}",
        job.id,
        job.status.as_str(),
        job.imported_tables,
        job.total_tables,
        job.created_at.format("%Y-%m-%d %H:%M:%S")
    )
}
