use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keel")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative Windows environment reconciler", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Make the machine match the desired-state document
    Apply,

    /// Preview what apply would change
    Status,

    /// Manage age keys and encrypt or decrypt single files
    #[command(subcommand)]
    Secret(SecretCommand),

    /// Encrypt or decrypt the desired-state document
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Check external tools, locations and the ledger
    Doctor,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Secret Commands
// ============================================================================

#[derive(Subcommand)]
pub enum SecretCommand {
    /// Generate a new age identity
    Keygen {
        /// Where to write the key (defaults to key.txt in the config dir)
        path: Option<PathBuf>,
    },

    /// Encrypt a file to <file>.age
    Encrypt {
        /// File to encrypt
        file: PathBuf,
    },

    /// Decrypt <file>.age next to itself
    Decrypt {
        /// Encrypted file ending in .age
        file: PathBuf,
    },
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Encrypt config.toml into config.toml.age
    Encrypt {
        /// Delete the plaintext afterwards
        #[arg(long)]
        remove: bool,
    },

    /// Decrypt config.toml.age into config.toml
    Decrypt {
        /// Overwrite an existing config.toml
        #[arg(short, long)]
        force: bool,
    },

    /// Delete the decrypted config cache
    CacheClear,
}
