//! Terminal front-end for `parley chat`.
//!
//! Reads lines from stdin and prints session events. The session and its
//! tasks know nothing about the terminal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use parley_client::{ChatSession, ClientTasks, Command, SessionEvent, WsConnector};
use parley_settings::ClientSettings;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Time the renderer gets to print the last events on exit.
const RENDER_DRAIN: Duration = Duration::from_millis(200);

/// How a session event is shown. `None` hides it.
pub fn render(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Received(text) => Some(format!("Received: {text}")),
        SessionEvent::Ack(ack) => Some(format!("Server: {ack}")),
        SessionEvent::Connected { client_id: Some(id) } => Some(format!("Connected ({id})")),
        SessionEvent::Connected { client_id: None } => None,
        SessionEvent::Disconnected { reason } => Some(format!("Not connected: {reason}")),
        SessionEvent::Status(status) => Some(status.clone()),
    }
}

/// What a line typed by the user means.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Send(String),
    Quit,
    Skip,
}

pub fn parse_input(line: &str) -> Input {
    match line.trim() {
        "" => Input::Skip,
        "/quit" | "/exit" => Input::Quit,
        text => Input::Send(text.to_owned()),
    }
}

async fn prompt_name<R>(lines: &mut tokio::io::Lines<R>) -> Result<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"Enter your name: ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            bail!("no name entered");
        };
        let name = line.trim();
        if !name.is_empty() {
            return Ok(name.to_owned());
        }
    }
}

/// Run the interactive client until `/quit`, EOF, or Ctrl-C.
pub async fn run(settings: ClientSettings, name: Option<String>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let name = match name {
        Some(name) => name,
        None => prompt_name(&mut lines).await?,
    };

    let connector = Arc::new(WsConnector::new(
        settings.server_url.clone(),
        settings.request_timeout(),
    ));
    let (session, mut events) = ChatSession::new(name, connector, settings);

    let renderer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Some(line) = render(&event) {
                println!("{line}");
            }
        }
    });

    session
        .connect_with_retry()
        .await
        .context("Could not connect to server")?;

    let (tx, commands) = mpsc::channel(32);
    let tasks = ClientTasks::spawn(Arc::clone(&session), commands);
    let stop = tasks.token();

    loop {
        let line = tokio::select! {
            () = stop.cancelled() => break,
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let command = match line.as_deref().map(parse_input) {
            Some(Input::Skip) => continue,
            Some(Input::Send(text)) => Command::Send(text),
            Some(Input::Quit) | None => Command::Quit,
        };
        let quit = command == Command::Quit;
        if tx.send(command).await.is_err() || quit {
            break;
        }
    }

    tasks.shutdown().await;
    drop(session);
    let _ = tokio::time::timeout(RENDER_DRAIN, renderer).await;
    Ok(())
}
