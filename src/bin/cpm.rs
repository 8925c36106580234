/// Interactive CP/M disk console application

use cpmdisk::*;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

/// Command completer for the REPL
struct CommandCompleter {
    commands: Vec<&'static str>,
}

impl CommandCompleter {
    fn new() -> Self {
        Self {
            commands: vec![
                "cat",
                "dir",
                "dpb",
                "exit",
                "format",
                "get",
                "help",
                "info",
                "ls",
                "map",
                "match",
                "open",
                "partitions",
                "put",
                "quit",
                "rm",
            ],
        }
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        // Only complete the command name
        let line_to_cursor = &line[..pos];
        if line_to_cursor.contains(' ') {
            return Ok((pos, vec![]));
        }

        let prefix = line_to_cursor.to_lowercase();
        let matches: Vec<Pair> = self
            .commands
            .iter()
            .filter(|cmd| cmd.starts_with(&prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}
impl Validator for CommandCompleter {}
impl Helper for CommandCompleter {}

/// An open image and the filesystem mapped from it
struct Session {
    path: String,
    disk: CpmDisk<MappedImage>,
}

/// Get the path to the history file
fn history_path() -> Option<std::path::PathBuf> {
    dirs::home_dir().map(|mut p| {
        p.push(".cpmdisk_history");
        p
    })
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!("=== CP/M Disk ===");
    println!("Interactive console for CP/M filesystem images.");
    println!("Type 'help' for available commands\n");

    let mut rl = match Editor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Failed to create editor: {}", e);
            return;
        }
    };
    rl.set_helper(Some(CommandCompleter::new()));

    if let Some(history_path) = history_path() {
        let _ = rl.load_history(&history_path);
    }

    let mut session: Option<Session> = None;

    loop {
        let input = match rl.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                if let Some(history_path) = history_path() {
                    let _ = rl.save_history(&history_path);
                }
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        };

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(input);

        let parts = parse_command_line(input);
        if parts.is_empty() {
            continue;
        }
        let command = parts[0].to_lowercase();

        match command.as_str() {
            "help" => {
                print_help();
            }
            "quit" | "exit" => {
                if let Some(history_path) = history_path() {
                    let _ = rl.save_history(&history_path);
                }
                println!("Goodbye!");
                break;
            }
            "open" => {
                if parts.len() < 2 {
                    println!("Usage: open <path> [preset]");
                    continue;
                }
                let Some(dpb) = preset_arg(parts.get(2)) else {
                    continue;
                };
                match CpmDisk::open_mapped(&parts[1], dpb) {
                    Ok(disk) => {
                        println!("Opened: {} ({} files)", parts[1], disk.files().len());
                        session = Some(Session {
                            path: parts[1].clone(),
                            disk,
                        });
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            "format" => {
                if parts.len() < 3 {
                    println!("Usage: format <path> <preset>");
                    println!("Presets: {}", DiskParameterBlock::preset_names().join(", "));
                    continue;
                }
                let Some(dpb) = preset_arg(parts.get(2)) else {
                    continue;
                };
                let result = io::map_image(&parts[1], &dpb).and_then(|image| CpmDisk::format(image, dpb));
                match result {
                    Ok(mut disk) => match disk.refresh() {
                        Ok(()) => {
                            println!("Formatted: {}", parts[1]);
                            session = Some(Session {
                                path: parts[1].clone(),
                                disk,
                            });
                        }
                        Err(e) => println!("Error: {}", e),
                    },
                    Err(e) => println!("Error: {}", e),
                }
            }
            "partitions" => {
                if parts.len() < 2 {
                    println!("Usage: partitions <path>");
                    continue;
                }
                match io::read_image(&parts[1]).and_then(|data| PartitionedDisk::load(&data)) {
                    Ok(disks) => list_partitions(&disks),
                    Err(e) => println!("Error: {}", e),
                }
            }
            _ => {
                let Some(session) = session.as_mut() else {
                    println!("No image loaded. Use 'open <path>' or 'format <path> <preset>' first.");
                    continue;
                };
                run_disk_command(session, &command, &parts);
            }
        }
    }
}

/// Commands that need an open image
fn run_disk_command(session: &mut Session, command: &str, parts: &[String]) {
    let disk = &mut session.disk;

    match command {
        "info" => print_info(&session.path, disk),
        "dpb" => println!("{}", disk.dpb()),
        "map" => draw_block_map(disk),
        "ls" | "dir" => {
            let user = match parts.get(1) {
                Some(arg) => match parse_user(arg) {
                    Some(user) => Some(user),
                    None => return,
                },
                None => None,
            };
            list_files(disk, user);
        }
        "cat" => {
            let Some(name) = parts.get(1) else {
                println!("Usage: cat <name> [user]");
                return;
            };
            let Some(user) = user_arg(parts.get(2)) else {
                return;
            };
            match disk.read_file(name, user) {
                Ok(data) => {
                    println!("{}:{} ({} bytes):", user, name.to_uppercase(), data.len());
                    print_hex_dump(&data, 512);
                }
                Err(e) => println!("Error: {}", e),
            }
        }
        "get" => {
            if parts.len() < 3 {
                println!("Usage: get <name> <output_path> [user]");
                return;
            }
            let Some(user) = user_arg(parts.get(3)) else {
                return;
            };
            match disk
                .read_file(&parts[1], user)
                .and_then(|data| io::write_image(&parts[2], &data).map(|_| data.len()))
            {
                Ok(len) => println!("Exported {} bytes to {}", len, parts[2]),
                Err(e) => println!("Error: {}", e),
            }
        }
        "put" => {
            let Some(source) = parts.get(1) else {
                println!("Usage: put <host_path> [name] [user]");
                return;
            };
            let name = match parts.get(2) {
                Some(name) => name.clone(),
                None => std::path::Path::new(source)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_uppercase())
                    .unwrap_or_default(),
            };
            let Some(user) = user_arg(parts.get(3)) else {
                return;
            };
            let result = io::read_image(source).and_then(|data| {
                let file = disk.create_file(&name, user, FileFlags::empty(), &data)?;
                disk.refresh()?;
                Ok(file)
            });
            match result {
                Ok(file) => println!("Wrote {}", file),
                Err(e) => println!("Error: {}", e),
            }
        }
        "rm" => {
            let Some(name) = parts.get(1) else {
                println!("Usage: rm <name> [user]");
                return;
            };
            let Some(user) = user_arg(parts.get(2)) else {
                return;
            };
            match disk.delete_file(name, user) {
                Ok(()) => println!("Deleted {}:{}", user, name.to_uppercase()),
                Err(e) => println!("Error: {}", e),
            }
        }
        "match" => match parts.get(1).map(|s| s.to_lowercase()).as_deref() {
            None => println!("Name matching: {:?}", disk.name_match()),
            Some("full") => disk.set_name_match(NameMatch::FullName),
            Some("base") => disk.set_name_match(NameMatch::BaseName),
            Some(other) => println!("Unknown rule: {} (use full or base)", other),
        },
        _ => {
            println!("Unknown command: {}. Type 'help' for available commands.", command);
        }
    }
}

/// Parse command line input, respecting quoted strings
fn parse_command_line(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
            }
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => {
                current.push(ch);
            }
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

/// Resolve an optional preset argument, defaulting to z80rb
fn preset_arg(arg: Option<&String>) -> Option<DiskParameterBlock> {
    let name = arg.map_or("z80rb", |s| s.as_str());
    let dpb = DiskParameterBlock::preset(name);
    if dpb.is_none() {
        println!(
            "Unknown preset: {} (available: {})",
            name,
            DiskParameterBlock::preset_names().join(", ")
        );
    }
    dpb
}

fn parse_user(arg: &str) -> Option<u8> {
    match arg.parse::<u8>() {
        Ok(user) if user <= MAX_USER => Some(user),
        _ => {
            println!("Invalid user number: {} (0-{})", arg, MAX_USER);
            None
        }
    }
}

/// Resolve an optional user argument, defaulting to 0
fn user_arg(arg: Option<&String>) -> Option<u8> {
    arg.map_or(Some(0), |s| parse_user(s))
}

fn print_help() {
    println!("Available commands:");
    println!("  open <path> [preset]           - Open a CP/M image (default preset: z80rb)");
    println!("  format <path> <preset>         - Create or overwrite an image with an empty filesystem");
    println!("  partitions <path>              - List the partitions of a partitioned image");
    println!("  info                           - Show filesystem usage");
    println!("  dpb                            - Show disk parameters");
    println!("  ls [user]                      - List files (dir)");
    println!("  cat <name> [user]              - Hex dump a file");
    println!("  get <name> <output_path> [user] - Export a file to the host filesystem");
    println!("  put <host_path> [name] [user]  - Import a host file");
    println!("  rm <name> [user]               - Delete a file");
    println!("  match [full|base]              - Show or set how names are matched");
    println!("  map                            - Visual block map (yellow=directory, white=used)");
    println!("  help                           - Show this help");
    println!("  quit, exit                     - Exit");
    println!();
    println!("Presets: {}", DiskParameterBlock::preset_names().join(", "));
    println!("Set RUST_LOG=debug for allocation details.");
}

fn print_info(path: &str, disk: &CpmDisk<MappedImage>) {
    let info = disk.info();
    println!("Filename: {}", path);
    println!("Parameters: {}", disk.dpb());
    println!("Block size: {} bytes", info.block_size);
    println!("Total blocks: {}", info.total_blocks);
    println!("Directory blocks: {}", info.directory_blocks);
    println!("Used blocks: {}", info.used_blocks);
    println!("Free blocks: {}", info.free_blocks);
    println!("Free space: {} KB", info.free_bytes() / 1024);
    println!("Directory entries: {} of {} free", info.free_entries, info.total_entries);
    println!("Files: {}", info.files);
}

fn list_files<B: DiskBuffer>(disk: &CpmDisk<B>, user: Option<u8>) {
    let files: Vec<CpmFile> = disk
        .files()
        .into_iter()
        .filter(|f| user.map_or(true, |u| f.user() == u))
        .collect();

    if files.is_empty() {
        println!("No files found.");
        return;
    }

    println!("{:>3} {:<12} {:>9} {:>4} {:>3} {}", "Usr", "Name", "Size", "Blks", "Ext", "Att");
    println!("{}", "-".repeat(40));
    for file in &files {
        println!(
            "{:>3} {:<12} {:>9} {:>4} {:>3} {}",
            file.user(),
            file.full_name(),
            file.size(),
            file.blocks().len(),
            file.entries().len(),
            file.flags()
        );
    }
    println!("{} file(s)", files.len());
}

fn list_partitions(disks: &PartitionedDisk<Vec<u8>>) {
    if disks.is_empty() {
        println!("No partitions.");
        return;
    }

    let table = match disks.table() {
        Ok(table) => table,
        Err(e) => {
            println!("Error: {}", e);
            return;
        }
    };
    for (entry, labeled) in table.iter().zip(disks.disks()) {
        let info = labeled.disk().info();
        println!(
            "{:<16} offset 0x{:08X}  {:>6} KB  {} files, {} KB free",
            labeled.label(),
            entry.offset,
            entry.dpb.filesystem_size() / 1024,
            info.files,
            info.free_bytes() / 1024
        );
    }
}

fn print_hex_dump(data: &[u8], max_bytes: usize) {
    let len = data.len().min(max_bytes);

    for (i, chunk) in data[..len].chunks(16).enumerate() {
        print!("{:04X}: ", i * 16);

        for (j, byte) in chunk.iter().enumerate() {
            print!("{:02X} ", byte);
            if j == 7 {
                print!(" ");
            }
        }

        // Pad if less than 16 bytes
        for j in chunk.len()..16 {
            print!("   ");
            if j == 7 {
                print!(" ");
            }
        }

        print!(" |");
        for byte in chunk {
            let c = if (32..127).contains(byte) { *byte as char } else { '.' };
            print!("{}", c);
        }
        println!("|");
    }

    if data.len() > max_bytes {
        println!("... ({} more bytes)", data.len() - max_bytes);
    }
}
