//! Headless front end: prints pipeline events and reads commands from stdin.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

use defectwatch::config;
use defectwatch::logging;
use defectwatch::pipeline::{Outcome, PipelineEvent};
use defectwatch::preferences::LastFolderStore;
use defectwatch::session::Session;

const EVENT_WAIT: Duration = Duration::from_millis(200);

#[derive(Debug)]
enum Command {
    Start(Option<PathBuf>),
    Stop,
    Folder(PathBuf),
    Forget,
    Status,
    Quit,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }
    let settings = config::load_or_create()
        .inspect_err(|err| tracing::error!(error = %err, "Cannot load settings"))?;
    let mut session = Session::new(settings, LastFolderStore::open_default()?);
    if let Some(folder) = std::env::args_os().nth(1) {
        session.select_folder(&PathBuf::from(folder))?;
    }
    if session.folder().is_some() {
        start(&mut session, None);
    } else {
        println!("No folder selected. Type `start <folder>` to begin.");
    }

    let commands = spawn_command_reader();
    loop {
        match commands.try_recv() {
            Ok(Command::Quit) | Err(TryRecvError::Disconnected) => break,
            Ok(command) => run_command(&mut session, command),
            Err(TryRecvError::Empty) => {}
        }
        drain_events(&session);
    }
    session.stop();
    drain_events(&session);
    Ok(())
}

fn run_command(session: &mut Session, command: Command) {
    match command {
        Command::Start(folder) => start(session, folder),
        Command::Stop => {
            if !session.stop() {
                println!("Not running.");
            }
        }
        Command::Folder(folder) => match session.select_folder(&folder) {
            Ok(()) => println!("Folder: {}", folder.display()),
            Err(err) => println!("{err}"),
        },
        Command::Forget => match session.clear_folder() {
            Ok(()) => println!("Folder forgotten."),
            Err(err) => println!("{err}"),
        },
        Command::Status => match (session.folder(), session.pipeline()) {
            (_, Some(handle)) => println!(
                "Watching {} ({})",
                handle.directory().display(),
                handle.strategy()
            ),
            (Some(folder), None) => println!("Stopped; folder {}", folder.display()),
            (None, None) => println!("Stopped; no folder selected"),
        },
        Command::Quit => {}
    }
}

fn start(session: &mut Session, folder: Option<PathBuf>) {
    if let Some(folder) = folder {
        if let Err(err) = session.select_folder(&folder) {
            println!("{err}");
            return;
        }
    }
    if let Err(err) = session.start() {
        println!("Cannot start: {err}");
    }
}

fn drain_events(session: &Session) {
    let Some(handle) = session.pipeline() else {
        std::thread::sleep(EVENT_WAIT);
        return;
    };
    let Some(first) = handle.recv_event_timeout(EVENT_WAIT) else {
        return;
    };
    print_event(&first);
    while let Some(event) = handle.try_recv_event() {
        print_event(&event);
    }
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::Started {
            directory,
            strategy,
            demo,
        } => {
            let mode = if *demo { ", demo mode" } else { "" };
            println!("Watching {} ({strategy}{mode})", directory.display());
        }
        PipelineEvent::PhotoReady { path } => println!("Photo: {}", path.display()),
        PipelineEvent::Verdict { path, verdict } => {
            println!("Result: {} -> {verdict}", path.display())
        }
        PipelineEvent::Resolved { path, outcome } => match outcome {
            Outcome::Untouched => println!("Analysis error: {}", path.display()),
            other => println!("{}: {other}", path.display()),
        },
        PipelineEvent::Stopped => println!("Stopped."),
    }
}

fn spawn_command_reader() -> Receiver<Command> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match parse_command(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => {
                    println!("Commands: start [folder], stop, folder <path>, forget, status, quit")
                }
            }
        }
    });
    rx
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    match (word, rest.is_empty()) {
        ("start", true) => Some(Command::Start(None)),
        ("start", false) => Some(Command::Start(Some(PathBuf::from(rest)))),
        ("stop", _) => Some(Command::Stop),
        ("folder", false) => Some(Command::Folder(PathBuf::from(rest))),
        ("forget", _) => Some(Command::Forget),
        ("status", _) => Some(Command::Status),
        ("quit" | "exit", _) => Some(Command::Quit),
        _ => None,
    }
}
