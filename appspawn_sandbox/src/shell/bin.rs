// Binary entry point for appspawn_sandbox
// Thin wrapper over the library's CLI

use anyhow::Result;

fn main() -> Result<()> {
    if let Err(e) = appspawn_sandbox::shell::run() {
        eprintln!("appspawn_sandbox fatal error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
