//! Interface de terminal do launchpad: spinner e saída colorida.
//!
//! Usa as crates `indicatif` para o spinner do modo rapid-fire e `console`
//! para estilização com cores. O [`LaunchProgress`] acompanha visualmente
//! os lançamentos no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::launcher::{RapidfireReport, StopReason};
use crate::model::{
    Job, JobSpec, JobStatus, JobSummary, LaunchReport, WorkflowId, WorkflowSpec, WorkflowStatus,
    WorkflowSummary,
};

fn job_style(status: JobStatus) -> Style {
    match status {
        JobStatus::Completed => Style::new().green().bold(),
        JobStatus::Failed => Style::new().red().bold(),
        JobStatus::Running | JobStatus::Ready => Style::new().yellow(),
        JobStatus::Waiting => Style::new().dim(),
    }
}

fn workflow_style(status: WorkflowStatus) -> Style {
    match status {
        WorkflowStatus::Completed => Style::new().green().bold(),
        WorkflowStatus::Failed => Style::new().red().bold(),
        WorkflowStatus::Running | WorkflowStatus::Ready => Style::new().yellow(),
    }
}

/// Indicador visual de progresso para o modo rapid-fire.
///
/// Exibe um spinner animado enquanto jobs são executados e uma linha
/// colorida por lançamento: sucesso (verde) ou falha (vermelho).
pub struct LaunchProgress {
    // Barra de progresso/spinner do indicatif.
    pb: ProgressBar,
}

impl LaunchProgress {
    /// Inicia o spinner com a mensagem fornecida.
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { pb }
    }

    /// Registra um lançamento concluído acima do spinner.
    pub fn launched(&self, report: &LaunchReport) {
        self.pb.println(launch_line(report));
        self.pb.set_message(format!("last: {} ({})", report.name, report.status));
    }

    /// Finaliza o spinner e exibe o total de jobs executados.
    pub fn finish(&self, report: &RapidfireReport) {
        self.pb.finish_and_clear();
        print_rapidfire(report);
    }
}

/// Imprime o total de um modo rapid-fire e o motivo da parada.
pub fn print_rapidfire(report: &RapidfireReport) {
    let reason = match report.stopped {
        StopReason::Drained => "nothing left to run",
        StopReason::LimitReached => "job limit reached",
        StopReason::GaveUpWaiting => "gave up waiting on other launchers",
    };
    println!(
        "Launched {} job(s): {} completed, {} failed ({reason})",
        report.launches.len(),
        Style::new().green().apply_to(report.completed()),
        Style::new().red().apply_to(report.failed()),
    );
}

fn launch_line(report: &LaunchReport) -> String {
    let style = job_style(report.status);
    let mark = if report.status == JobStatus::Completed {
        "✓"
    } else {
        "✗"
    };
    let mut line = format!(
        "  {} job {} '{}' {} in {}ms",
        style.apply_to(mark),
        report.job_id,
        report.name,
        style.apply_to(report.status),
        report.duration_ms
    );
    if let Some(failure) = &report.failure {
        line.push_str(&format!(": {failure}"));
    }
    line
}

/// Imprime o resultado de um único lançamento.
pub fn print_launch(report: &LaunchReport) {
    println!("{}", launch_line(report));
}

/// Imprime o resumo de um workflow, um job por linha.
pub fn print_summary(summary: &WorkflowSummary) {
    println!(
        "Workflow {} '{}' {}",
        summary.id,
        summary.name,
        workflow_style(summary.status).apply_to(summary.status)
    );
    for job in &summary.jobs {
        println!("{}", job_row(job));
        if let Some(error) = &job.error {
            println!("         {}", Style::new().red().apply_to(error));
        }
    }
}

fn job_row(job: &JobSummary) -> String {
    let mut row = format!(
        "  {:>5}  {:<24} {}",
        job.id,
        job.name,
        job_style(job.status).apply_to(format!("{:<9}", job.status))
    );
    if job.attempts > 1 {
        row.push_str(&format!(" ({} attempts)", job.attempts));
    }
    row
}

/// Imprime o workflow recém-adicionado e as dependências de cada job.
pub fn print_added(id: WorkflowId, spec: &WorkflowSpec) {
    println!(
        "Added workflow {id} '{}' with {} job(s)",
        spec.name,
        spec.jobs.len()
    );
    for job in &spec.jobs {
        println!("{}", job_spec_line(job));
    }
}

fn job_spec_line(job: &JobSpec) -> String {
    let tasks = job.tasks.iter().map(|t| t.kind()).collect::<Vec<_>>().join(", ");
    if job.parents.is_empty() {
        format!("  {:<24} [{tasks}]", job.name)
    } else {
        format!(
            "  {:<24} [{tasks}] after {}",
            job.name,
            Style::new().dim().apply_to(job.parents.join(", "))
        )
    }
}

/// Imprime uma linha por workflow.
pub fn print_workflows(summaries: &[WorkflowSummary]) {
    if summaries.is_empty() {
        println!("No workflows.");
        return;
    }
    for summary in summaries {
        let done = summary
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Completed)
            .count();
        println!(
            "{:>5}  {:<24} {}  {done}/{} jobs completed",
            summary.id,
            summary.name,
            workflow_style(summary.status).apply_to(format!("{:<9}", summary.status)),
            summary.jobs.len()
        );
    }
}

/// Imprime o registro completo do job formatado em JSON.
pub fn print_job(job: &Job) -> serde_json::Result<()> {
    println!(
        "{}",
        job_style(job.status).apply_to(format!("─── Job {} ───", job.id))
    );
    println!("{}", serde_json::to_string_pretty(job)?);
    Ok(())
}
