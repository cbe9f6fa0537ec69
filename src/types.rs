// types.rs
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Renew control-plane certificates", long_about = None)]
pub struct Args {
    // Cluster topology file
    #[arg(short, long, default_value = "cluster_config.json")]
    pub config: String,

    // Directory holding the kubeconfig files
    #[arg(short, long, default_value = "/etc/kubernetes")]
    pub kubernetes_dir: PathBuf,

    #[arg(short, long, default_value = "logs/cert-renew.log")]
    pub log_file: String,

    // Enable debug mode
    #[arg(short, long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the certificates and CAs of this control plane
    List,
    /// Renew a certificate, or every certificate with `all`
    Renew {
        name: String,
        /// Write a key and CSR for an external CA instead of signing locally
        #[arg(long)]
        csr_only: bool,
        #[arg(long, required_if_eq("csr_only", "true"))]
        csr_dir: Option<PathBuf>,
    },
    /// Show when each certificate and CA expires
    CheckExpiration,
    /// Write a default topology file to the --config path
    InitConfig {
        #[arg(long)]
        force: bool,
    },
}
