// src/main.rs
mod cert;
mod config;
mod kubeconfig;
mod renewal;
mod types;
mod utils;

use cert::CertOperationError;
use chrono::Utc;
use clap::Parser;
use config::ClusterConfig;
use renewal::{short_human_duration, Manager};
use std::io;
use std::path::Path;
use types::{Args, Command};
use utils::logging::{ConsoleLogger, FileLogger, Logger, MultiLogger};

fn main() -> io::Result<()> {
    let args = Args::parse();

    if let Command::InitConfig { force } = args.command {
        return init_config(&args.config, force);
    }

    let mut logger: Box<dyn Logger> = Box::new(MultiLogger::new(vec![
        Box::new(FileLogger::new(&args.log_file, args.debug)?),
        Box::new(ConsoleLogger::new(args.debug)),
    ]));

    let config = if Path::new(&args.config).exists() {
        ClusterConfig::load_from_file(&args.config)?
    } else {
        logger.log(&format!(
            "{} not found, using the default topology",
            args.config
        ));
        ClusterConfig::default()
    };

    let mut manager = Manager::new(&config, &args.kubernetes_dir, logger)?;

    match args.command {
        Command::List => list(&manager),
        Command::Renew {
            name,
            csr_only,
            csr_dir,
        } => {
            let csr_dir = if csr_only { csr_dir } else { None };
            renew(&mut manager, &name, csr_dir.as_deref())
        }
        Command::CheckExpiration => check_expiration(&manager),
        Command::InitConfig { .. } => Ok(()),
    }
}

fn init_config(path: &str, force: bool) -> io::Result<()> {
    if Path::new(path).exists() && !force {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists, use --force to overwrite", path),
        ));
    }
    ClusterConfig::default().save_to_file(path)?;
    println!("Wrote default configuration to {}", path);
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn list(manager: &Manager) -> io::Result<()> {
    println!(
        "{:<26} {:<26} {:<16} {:<8} DESCRIPTION",
        "CERTIFICATE", "FILE", "CA", "PRESENT"
    );
    for cert in manager.certificates() {
        println!(
            "{:<26} {:<26} {:<16} {:<8} {}",
            cert.name,
            cert.file_name,
            cert.ca_name,
            yes_no(manager.certificate_exists(&cert.name)?),
            cert.long_name
        );
    }

    println!();
    println!("{:<26} {:<16} {:<8} DESCRIPTION", "CA", "FILE", "PRESENT");
    for ca in manager.cas() {
        println!(
            "{:<26} {:<16} {:<8} {}",
            ca.name,
            ca.file_name,
            yes_no(manager.ca_exists(&ca.name)?),
            ca.long_name
        );
    }
    Ok(())
}

fn renew_one(
    manager: &mut Manager,
    name: &str,
    csr_dir: Option<&Path>,
    skip_missing: bool,
) -> Result<String, CertOperationError> {
    let (long_name, ca_name, exists) = {
        let handler = manager.certificate(name)?;
        (handler.long_name.clone(), handler.ca_name.clone(), handler.exists())
    };

    if skip_missing && !exists {
        return Ok(format!("MISSING! {}", long_name));
    }

    if let Some(dir) = csr_dir {
        manager.create_renew_csr(name, dir)?;
        return Ok(format!("{}: key and CSR written to {}", name, dir.display()));
    }

    if manager.is_externally_managed(&ca_name)? {
        return Ok(format!(
            "Detected external {} CA, {} can't be renewed",
            ca_name, long_name
        ));
    }

    manager.renew_using_local_ca(name)?;
    Ok(format!("{} renewed", long_name))
}

/// Renews one certificate or, for `all`, every certificate. Failures do not stop the
/// remaining renewals; they are reported together at the end.
fn renew(manager: &mut Manager, target: &str, csr_dir: Option<&Path>) -> io::Result<()> {
    let renew_all = target == "all";
    let names: Vec<String> = if renew_all {
        manager.certificates().iter().map(|c| c.name.clone()).collect()
    } else {
        vec![target.to_string()]
    };

    let mut failures: Vec<CertOperationError> = Vec::new();
    for name in &names {
        match renew_one(manager, name, csr_dir, renew_all) {
            Ok(message) => println!("{}", message),
            Err(e) => {
                eprintln!("error: {}", e);
                failures.push(e);
            }
        }
    }

    if failures.len() == 1 && !renew_all {
        return Err(failures.remove(0).into());
    }
    if !failures.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!(
                "{} of {} certificates failed to renew",
                failures.len(),
                names.len()
            ),
        ));
    }

    if csr_dir.is_none() {
        println!("\nDone renewing certificates. You must restart the kube-apiserver, kube-controller-manager, kube-scheduler and etcd, so that they can use the new certificates.");
    }
    Ok(())
}

fn check_expiration(manager: &Manager) -> io::Result<()> {
    let now = Utc::now();

    println!(
        "{:<26} {:<22} {:<10} {:<9} {:<16} EXTERNALLY MANAGED",
        "CERTIFICATE", "EXPIRES", "RESIDUAL", "STATUS", "CERTIFICATE AUTHORITY"
    );
    for cert in manager.certificates() {
        if !cert.exists() {
            println!("!MISSING! {}", cert.name);
            continue;
        }
        match manager.certificate_expiration(&cert.name) {
            Ok(info) => println!(
                "{:<26} {:<22} {:<10} {:<9} {:<16} {}",
                info.name,
                info.expiration_date.format("%b %d, %Y %H:%M UTC"),
                short_human_duration(info.residual_time(now)),
                info.status(now),
                cert.ca_name,
                yes_no(info.externally_managed)
            ),
            Err(e) => eprintln!("error: {}", e),
        }
    }

    println!();
    println!(
        "{:<26} {:<22} {:<10} {:<9} EXTERNALLY MANAGED",
        "CERTIFICATE AUTHORITY", "EXPIRES", "RESIDUAL", "STATUS"
    );
    for ca in manager.cas() {
        // The CA key may be absent, so only the certificate decides presence here.
        match manager.ca_expiration(&ca.name) {
            Ok(info) => println!(
                "{:<26} {:<22} {:<10} {:<9} {}",
                info.name,
                info.expiration_date.format("%b %d, %Y %H:%M UTC"),
                short_human_duration(info.residual_time(now)),
                info.status(now),
                yes_no(info.externally_managed)
            ),
            Err(_) if !ca.exists() => println!("!MISSING! {}", ca.name),
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(())
}
