mod build_ebpf;
mod codegen;

use clap::Parser;

#[derive(Debug, Parser)]
pub struct Options {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Build the kernel programs
    BuildEbpf(build_ebpf::Options),
    /// Generate kernel type bindings from the running kernel's BTF
    Codegen,
}

fn main() -> Result<(), anyhow::Error> {
    let opts = Options::parse();

    match opts.command {
        Command::BuildEbpf(opts) => build_ebpf::build_ebpf(opts),
        Command::Codegen => codegen::generate(),
    }
}
