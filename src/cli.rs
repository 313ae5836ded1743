//! Interface de linha de comando do reelqueue baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (serve, run, add,
//! add-bulk, list, requeue, recover, quota) e flags globais
//! (--config, --daily-limit, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// reelqueue: fila de aquisição e publicação de vídeos com cota diária.
#[derive(Debug, Parser)]
#[command(name = "reelqueue", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração.
    #[arg(long, short, global = true, default_value = "reelqueue.toml")]
    pub config: PathBuf,

    /// Sobrescreve o limite diário de publicações nesta execução.
    #[arg(long, global = true, value_parser = parse_limit)]
    pub daily_limit: Option<u32>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

fn parse_limit(raw: &str) -> Result<u32, String> {
    crate::config::parse_daily_limit(raw).map_err(|e| e.to_string())
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Roda o agendador até Ctrl-C; SIGUSR1 dispara um ciclo imediato.
    Serve {
        /// Intervalo entre ciclos em minutos (sobrescreve o arquivo).
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Executa um único ciclo agora e mostra o resultado.
    Run,

    /// Enfileira um vídeo.
    Add {
        /// URL ou identificador do vídeo de origem.
        source: String,

        /// Título a usar no upload.
        #[arg(long)]
        title: Option<String>,

        /// Texto inicial da descrição.
        #[arg(long)]
        description: Option<String>,
    },

    /// Enfileira um vídeo por linha de um arquivo ("-" lê da entrada padrão).
    AddBulk {
        /// Arquivo com uma referência por linha; linhas com `#` são ignoradas.
        file: PathBuf,
    },

    /// Lista os jobs em ordem de criação.
    List {
        /// Mostra apenas jobs neste estado.
        #[arg(long)]
        state: Option<String>,

        /// Imprime JSON em vez da tabela.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Devolve um job com falha à fila.
    Requeue {
        /// Id do job ou um prefixo único.
        id: String,
    },

    /// Reseta jobs presos em acquiring/publishing após uma interrupção.
    Recover,

    /// Mostra o uso da cota de hoje.
    Quota,
}
