//!
//! ferry CLI binary
//! ----------------
//! Interactive client for a ferry server. Connects over TCP and drives the
//! text protocol: `ls`, `get <remote> [local]`, `put <local>`. Also supports
//! a one-shot `--cmd` mode for scripting.

use std::env;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};

use ferry::cli::TransferClient;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--host <addr>] [--port <port>] [--cmd \"<command>\"]\n\nFlags:\n  --host <addr>    Server address (default: 127.0.0.1)\n  --port <port>    Server port (default: 5001)\n  --cmd <command>  Run a single command and exit\n  -h, --help       Show this help\n\nInteractive commands:\n  ls                         list stored files\n  get <remote> [local]       download a file (optionally renamed locally)\n  put <local>                upload a file (stored under its basename)\n  help                       show this help\n  quit | exit                exit the client\n\nExamples:\n  {program} --port 5001\n  {program} --cmd \"put ./notes.txt\"\n  {program} --cmd ls"
    );
}

fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);

    let mut host = "127.0.0.1".to_string();
    let mut port = "5001".to_string();
    let mut oneshot: Option<String> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                if i + 1 >= args.len() { eprintln!("--host requires a value"); print_usage(&program); std::process::exit(2); }
                host = args[i + 1].clone();
                i += 2; continue;
            }
            "--port" => {
                if i + 1 >= args.len() { eprintln!("--port requires a value"); print_usage(&program); std::process::exit(2); }
                port = args[i + 1].clone();
                i += 2; continue;
            }
            "--cmd" => {
                if i + 1 >= args.len() { eprintln!("--cmd requires a value"); print_usage(&program); std::process::exit(2); }
                oneshot = Some(args[i + 1].clone());
                i += 2; continue;
            }
            "-h" | "--help" => {
                print_usage(&program);
                return Ok(());
            }
            other => {
                eprintln!("unknown argument: {}", other);
                print_usage(&program);
                std::process::exit(2);
            }
        }
    }

    let rt = tokio::runtime::Runtime::new()?;
    let addr = format!("{}:{}", host, port);
    let mut client = rt
        .block_on(TransferClient::connect(&addr))
        .with_context(|| format!("failed to connect to {}", addr))?;

    if let Some(command) = oneshot {
        if !dispatch(&rt, &mut client, &command) {
            std::process::exit(1);
        }
        return Ok(());
    }

    println!("Connected to {}. Commands: ls, get <file> [local], put <file>, exit", addr);
    run_repl(rt, client, &program)
}

fn run_repl(rt: tokio::runtime::Runtime, mut client: TransferClient, program: &str) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut input = String::new();
    loop {
        input.clear();
        print!("ferry> ");
        let _ = stdout.flush();
        if stdin.read_line(&mut input).is_err() || input.is_empty() {
            break;
        }
        let line = input.trim();
        if line.is_empty() {
            continue;
        }
        let lower = line.to_ascii_lowercase();
        if lower == "exit" || lower == "quit" {
            break;
        }
        if lower == "help" {
            print_usage(program);
            continue;
        }
        dispatch(&rt, &mut client, line);
    }
    Ok(())
}

/// Run one command against the server, printing results. Returns false when
/// the command failed.
fn dispatch(rt: &tokio::runtime::Runtime, client: &mut TransferClient, line: &str) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let command = match parts.first() {
        Some(t) => t.to_ascii_lowercase(),
        None => return true,
    };
    match command.as_str() {
        "ls" => match rt.block_on(client.list()) {
            Ok(listing) => {
                println!("{}", listing);
                true
            }
            Err(e) => {
                eprintln!("error: {}", e);
                false
            }
        },
        "get" => {
            if parts.len() < 2 {
                eprintln!("usage: get <remote_filename> [local_filename]");
                return false;
            }
            // A trailing token names the local destination when present.
            let (remote, local) = if parts.len() >= 3 {
                (parts[1..parts.len() - 1].join(" "), parts[parts.len() - 1].to_string())
            } else {
                let remote = parts[1..].join(" ");
                let local = Path::new(&remote)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| remote.clone());
                (remote, local)
            };
            match rt.block_on(client.download(&remote, Path::new(&local))) {
                Ok(size) => {
                    println!("Downloaded: {} ({} bytes)", local, size);
                    true
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    false
                }
            }
        }
        "put" => {
            if parts.len() < 2 {
                eprintln!("usage: put <local_path>");
                return false;
            }
            let local = parts[1..].join(" ");
            let path = Path::new(&local);
            if !path.exists() {
                eprintln!("File does not exist: {}", local);
                return false;
            }
            let remote = match path.file_name() {
                Some(n) => n.to_string_lossy().to_string(),
                None => {
                    eprintln!("not a file: {}", local);
                    return false;
                }
            };
            match rt.block_on(client.upload(path, &remote)) {
                Ok(size) => {
                    println!("Uploaded: {} ({} bytes)", remote, size);
                    true
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    false
                }
            }
        }
        _ => {
            eprintln!("Unknown command. Type 'help' for commands.");
            false
        }
    }
}
