//! `vdm pause|resume|stop <id>` – signal a job of the running `vdm get`.

use anyhow::Result;
use vdm_core::control::ControlCommand;

use crate::cli::control_socket;

pub async fn run_control(command: ControlCommand) -> Result<()> {
    let path = control_socket::socket_path()?;
    control_socket::send_command(&path, command).await?;
    match command {
        ControlCommand::Pause(id) => println!("Pause requested for job {id}"),
        ControlCommand::Resume(id) => println!("Resume requested for job {id}"),
        ControlCommand::Stop(id) => println!("Stop requested for job {id}"),
    }
    Ok(())
}
