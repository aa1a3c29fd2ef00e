use std::path::PathBuf;
use std::process::Command;

use anyhow::{bail, Context};
use clap::Parser;

use crate::codegen;

#[derive(Debug, Copy, Clone)]
pub enum Architecture {
    BpfEl,
    BpfEb,
}

impl std::str::FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "bpfel-unknown-none" => Architecture::BpfEl,
            "bpfeb-unknown-none" => Architecture::BpfEb,
            _ => return Err("invalid target".to_owned()),
        })
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Architecture::BpfEl => "bpfel-unknown-none",
            Architecture::BpfEb => "bpfeb-unknown-none",
        })
    }
}

#[derive(Debug, Parser)]
pub struct Options {
    /// Set the endianness of the BPF target
    #[clap(default_value = "bpfel-unknown-none", long)]
    pub target: Architecture,
    /// Regenerate the kernel bindings even if they already exist
    #[clap(long)]
    pub regenerate: bool,
}

pub fn build_ebpf(opts: Options) -> Result<(), anyhow::Error> {
    let dir = PathBuf::from(codegen::EBPF_CRATE);
    if opts.regenerate || !dir.join(codegen::BINDINGS).exists() {
        codegen::generate()?;
    }

    let target = format!("--target={}", opts.target);
    // debug builds pull in formatting code the BPF linker rejects
    let args = [
        "build",
        "--verbose",
        target.as_str(),
        "-Z",
        "build-std=core",
        "--release",
    ];

    // RUSTUP_TOOLCHAIN is removed so the rust-toolchain.toml of the -ebpf crate is honored.
    let status = Command::new("cargo")
        .current_dir(dir)
        .env_remove("RUSTUP_TOOLCHAIN")
        .args(args)
        .status()
        .context("failed to build bpf program")?;
    if !status.success() {
        bail!("building the bpf program failed with {status}");
    }
    Ok(())
}
