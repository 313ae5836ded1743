//! Interface de terminal do reelqueue: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para o spinner de um ciclo manual e `console`
//! para estilização com cores. O [`CycleProgress`] acompanha visualmente
//! um ciclo no terminal; as funções `print_*` formatam listagens.

use chrono::{DateTime, Local, Utc};
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::engine::CycleOutcome;
use crate::error::EngineError;
use crate::quota::QuotaStatus;
use crate::state_machine::{Job, JobState};

/// Indicador visual de progresso para um ciclo disparado pela CLI.
///
/// Exibe um spinner animado enquanto o ciclo roda e uma mensagem colorida
/// com o resultado: verde para publicação, vermelho para falha, amarelo
/// para cota esgotada ou fila vazia.
pub struct CycleProgress {
    // Spinner do indicatif.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl CycleProgress {
    /// Inicia o spinner com a mensagem dada.
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Finaliza o spinner e exibe o resultado do ciclo.
    pub fn finish(&self, result: &Result<CycleOutcome, EngineError>) {
        self.pb.finish_and_clear();
        match result {
            Ok(CycleOutcome::JobSucceeded { id }) => {
                println!("  {} Published job {}", self.green.apply_to("✓"), short(id));
            }
            Ok(CycleOutcome::JobFailed { id, reason }) => {
                println!("  {} Job {} failed: {reason}", self.red.apply_to("✗"), short(id));
            }
            Ok(CycleOutcome::QuotaExhausted {
                published_today,
                daily_limit,
            }) => {
                println!(
                    "  {} Daily quota exhausted ({published_today}/{daily_limit})",
                    self.yellow.apply_to("■")
                );
            }
            Ok(CycleOutcome::QueueEmpty) => {
                println!("  {} Nothing to do", self.yellow.apply_to("○"));
            }
            Err(EngineError::QueueBusy { owner }) => {
                println!("  {} Queue busy: {owner} is running a cycle", self.yellow.apply_to("■"));
                println!(
                    "    {}",
                    Style::new()
                        .dim()
                        .apply_to("To get a cycle from a running `reelqueue serve`, send it SIGUSR1 (kill -USR1 <pid>).")
                );
            }
            Err(e) => {
                println!("  {} Cycle aborted: {e}", self.red.apply_to("✗"));
            }
        }
    }
}

/// Estilo associado a cada estado na listagem.
fn state_style(state: JobState) -> Style {
    match state {
        JobState::Published => Style::new().green(),
        JobState::Failed => Style::new().red(),
        JobState::Acquiring | JobState::Publishing => Style::new().cyan(),
        JobState::Acquired => Style::new().blue(),
        JobState::Pending => Style::new().dim(),
    }
}

fn short(id: &str) -> &str {
    &id[..8.min(id.len())]
}

fn local_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Imprime a tabela de jobs em ordem de criação.
pub fn print_jobs(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("{}", Style::new().dim().apply_to("No jobs in the queue."));
        return;
    }

    let header = Style::new().bold();
    println!(
        "{}",
        header.apply_to(format!(
            "{:<8}  {:<10}  {:<16}  {}",
            "ID", "STATE", "UPDATED", "SOURCE"
        ))
    );
    for job in jobs {
        let state = format!("{:<10}", job.state.as_str());
        let when = job.published_at.as_ref().unwrap_or(&job.updated_at);
        println!(
            "{:<8}  {}  {:<16}  {}",
            job.short_id(),
            state_style(job.state).apply_to(state),
            local_time(when),
            job.source_reference
        );
        if let Some(error) = job.last_error.as_deref()
            && job.state.is_terminal()
        {
            println!("          {}", Style::new().red().dim().apply_to(error));
        }
    }
}

/// Imprime o uso da cota diária.
pub fn print_quota(status: &QuotaStatus) {
    let style = if status.is_exhausted() {
        Style::new().yellow().bold()
    } else {
        Style::new().green().bold()
    };
    println!(
        "Published today: {}  ({} remaining)",
        style.apply_to(status),
        status.remaining()
    );
}

/// Imprime os jobs recém-enfileirados.
pub fn print_enqueued(jobs: &[Job]) {
    let green = Style::new().green().bold();
    for job in jobs {
        println!(
            "  {} {}  {}",
            green.apply_to("+"),
            job.short_id(),
            job.source_reference
        );
    }
    println!("{} job(s) enqueued", jobs.len());
}

/// Imprime um job cujo estado foi alterado por uma ação do operador.
pub fn print_moved(job: &Job, from: JobState) {
    println!(
        "  {} {}  {} → {}",
        Style::new().cyan().apply_to("↻"),
        job.short_id(),
        from,
        state_style(job.state).apply_to(job.state)
    );
}
