//! Interface de linha de comando do launchpad baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (add, status, list,
//! job, reset, singleshot, rapidfire) e flags globais (--config, --store, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::model::{JobId, WorkflowId};

/// launchpad: submete workflows de jobs e os executa com launchers.
#[derive(Debug, Parser)]
#[command(name = "launchpad", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para o arquivo de configuração.
    #[arg(long, global = true, default_value = "launchpad.toml")]
    pub config: PathBuf,

    /// Banco SQLite a usar, sobrepondo a configuração.
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Adiciona um workflow a partir de um arquivo JSON ou TOML.
    Add {
        /// Caminho do documento do workflow.
        file: PathBuf,
    },

    /// Mostra o status de cada job de um workflow.
    Status {
        workflow: WorkflowId,

        /// Emite o resumo em JSON.
        #[arg(long)]
        json: bool,
    },

    /// Lista todos os workflows.
    List,

    /// Mostra o registro completo de um job.
    Job { id: JobId },

    /// Remove todos os workflows do banco.
    Reset {
        /// Confirma a operação destrutiva.
        #[arg(long)]
        yes: bool,
    },

    /// Executa exatamente um job READY e sai.
    Singleshot {
        /// Restringe a seleção a um workflow.
        #[arg(long)]
        workflow: Option<WorkflowId>,
    },

    /// Executa jobs até não restar nenhum READY ou RUNNING.
    Rapidfire {
        /// Restringe a seleção a um workflow.
        #[arg(long)]
        workflow: Option<WorkflowId>,

        /// Número máximo de jobs a executar.
        #[arg(long)]
        max_jobs: Option<usize>,
    },
}
