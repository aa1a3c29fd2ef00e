use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context};

pub const EBPF_CRATE: &str = "insight-ebpf";
pub const BINDINGS: &str = "src/binding.rs";

/// Kernel types the programs read fields of. Their dependencies are pulled in with them.
const TYPES: &[&str] = &["task_struct", "file", "sock"];

/// Writes bindings for the running kernel's BTF into the kernel crate.
pub fn generate() -> Result<(), anyhow::Error> {
    let output = Command::new("aya-tool")
        .arg("generate")
        .args(TYPES)
        .output()
        .context("failed to run aya-tool (install it with `cargo install bindgen-cli aya-tool`)")?;
    if !output.status.success() {
        bail!(
            "aya-tool failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let path = Path::new(EBPF_CRATE).join(BINDINGS);
    fs::write(&path, output.stdout)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
