//! `plget stop` – signal a running download to wind down.

use anyhow::Result;

use crate::cli::control_socket;

pub async fn run_stop() -> Result<()> {
    let path = plget_core::control::default_control_socket_path()?;
    if control_socket::send_shutdown(&path).await? {
        println!("Shutdown requested; in-flight items will finish first.");
    } else {
        println!("No running plget found.");
    }
    Ok(())
}
