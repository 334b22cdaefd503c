use crate::{Result, error};
use snafu::ResultExt;
use std::{process::Stdio, time::Duration};
use tokio::{io::AsyncReadExt, process::Command, time::timeout};

/// Deadline applied to every completion probe and to the engine-level race.
pub(crate) const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// Captured stdout is truncated at this size; the rest is read and discarded
/// so the child never blocks on a full pipe.
pub(crate) const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Run a command and capture stdout under the shared subprocess contract:
/// the given deadline bounds the whole run, stderr is discarded, output is
/// capped at [`MAX_OUTPUT_BYTES`], and a missed deadline yields the
/// distinguished timeout error. A non-zero exit status is not an error here;
/// probe heuristics judge the output, not the status.
///
/// The child has `kill_on_drop` set, so cancelling the future (including via
/// the engine's race) kills and reaps the subprocess.
pub(crate) async fn run_capturing(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    deadline: Duration,
) -> Result<String> {
    let command_display = display_command(program, args);

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().with_context(|_| error::CommandSpawnSnafu {
        command: command_display.clone(),
    })?;

    let mut stdout = child
        .stdout
        .take()
        .expect("child stdout requested as piped");

    let capture = async {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = stdout
                .read(&mut chunk)
                .await
                .with_context(|_| error::CommandIoSnafu {
                    command: command_display.clone(),
                })?;
            if n == 0 {
                break;
            }
            let room = MAX_OUTPUT_BYTES.saturating_sub(buf.len());
            if room > 0 {
                buf.extend_from_slice(&chunk[..n.min(room)]);
            }
        }

        child.wait().await.with_context(|_| error::CommandIoSnafu {
            command: command_display.clone(),
        })?;

        Ok::<_, error::Error>(buf)
    };

    match timeout(deadline, capture).await {
        Ok(Ok(buf)) => Ok(String::from_utf8_lossy(&buf).into_owned()),
        Ok(Err(e)) => Err(e),
        Err(_) => error::CommandTimeoutSnafu {
            command: command_display,
            timeout: deadline,
        }
        .fail(),
    }
}

fn display_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}
