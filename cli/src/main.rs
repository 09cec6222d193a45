use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use frames::{Cursor, Shape, Style, TextShape, Transform};
use replica::board::{display_name, generate_board_id, is_valid_board_id, room_name};
use replica::presence::{random_identity, random_peer_id};
use replica::session::{self, SessionEvent, SessionHandle};
use replica::{
    ConfigError, JsonFileBackend, MemoryScene, PersistenceBackend, PersistenceError, ReplicaConfig, SceneChange,
    SceneDocument, SessionError,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("timed out waiting for the relay at {0}")]
    ConnectTimeout(String),
}

#[derive(Parser, Debug)]
#[command(name = "openboard", about = "Command line peer for shared whiteboard rooms")]
struct Cli {
    /// Relay base url.
    #[arg(long, env = "OPENBOARD_WS_URL")]
    url: Option<String>,

    /// Directory for saved boards.
    #[arg(long, env = "OPENBOARD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Display name shown to other peers. Random if omitted.
    #[arg(long, env = "OPENBOARD_NAME")]
    name: Option<String>,

    /// Do not load or save the board locally.
    #[arg(long, default_value_t = false)]
    no_save: bool,

    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new board id.
    New,
    /// List recently saved boards.
    Boards(BoardsArgs),
    /// Join a board and add shapes.
    Draw(DrawArgs),
    /// Join a board and print presence and remote edits until ctrl-c.
    Watch(BoardArg),
    /// Join a board and print its current contents as JSON.
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct BoardArg {
    #[arg(value_parser = parse_board_id)]
    board: String,
}

#[derive(Args, Debug)]
struct BoardsArgs {
    /// Forget a saved board instead of listing.
    #[arg(long, value_parser = parse_board_id)]
    delete: Option<String>,
}

#[derive(Args, Debug)]
struct DrawArgs {
    #[arg(value_parser = parse_board_id)]
    board: String,

    /// Rectangle as `left,top,width,height`. Repeatable.
    #[arg(long, value_parser = parse_rect)]
    rect: Vec<Shape>,

    /// Text label as `left,top,label`. Repeatable.
    #[arg(long, value_parser = parse_text)]
    text: Vec<Shape>,

    /// JSONL file of shapes, or - for stdin.
    #[arg(long)]
    input: Option<String>,

    /// Stay in the room this long after drawing so peers see the cursor.
    #[arg(long, default_value_t = 0)]
    linger_ms: u64,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[arg(value_parser = parse_board_id)]
    board: String,

    /// Write to a file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Quiet period with no remote changes before exporting.
    #[arg(long, default_value_t = 500)]
    settle_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "openboard=info,replica=warn".into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    match cli.command {
        Command::New => {
            let id = generate_board_id();
            println!("{id}\t{}\t{}", display_name(&id), room_name(&id));
            Ok(())
        }
        Command::Boards(ref args) => run_boards(&config, args),
        Command::Draw(ref args) => run_draw(&cli, config, args).await,
        Command::Watch(ref args) => run_watch(&cli, config, &args.board).await,
        Command::Export(ref args) => run_export(&cli, config, args).await,
    }
}

fn build_config(cli: &Cli) -> Result<ReplicaConfig, CliError> {
    let mut config = ReplicaConfig::from_env();
    if let Some(url) = &cli.url {
        config.ws_url.clone_from(url);
    }
    if let Some(dir) = &cli.data_dir {
        config.data_dir.clone_from(dir);
    }
    config.validate()?;
    Ok(config)
}

fn run_boards(config: &ReplicaConfig, args: &BoardsArgs) -> Result<(), CliError> {
    let backend = JsonFileBackend::new(&config.data_dir);
    if let Some(board) = &args.delete {
        backend.delete_board(board)?;
        println!("deleted {board}");
        return Ok(());
    }
    tracing::debug!(dir = %backend.dir().display(), "listing saved boards");
    for board in backend.recent_boards()? {
        println!("{}\t{}\t{}", board.id, display_name(&board.id), board.last_modified);
    }
    Ok(())
}

async fn run_draw(cli: &Cli, config: ReplicaConfig, args: &DrawArgs) -> Result<(), CliError> {
    let mut shapes: Vec<Shape> = args.rect.iter().chain(&args.text).cloned().collect();
    if let Some(input) = &args.input {
        shapes.extend(read_shapes(input)?);
    }

    let session = join(cli, config, &args.board).await?;
    for shape in shapes {
        let anchor = *shape.transform();
        let id = session.add(shape).await?;
        session.set_cursor(Some(Cursor { x: anchor.left, y: anchor.top })).await?;
        println!("{id}");
    }
    if args.linger_ms > 0 {
        tokio::time::sleep(Duration::from_millis(args.linger_ms)).await;
    }
    session.shutdown().await?;
    Ok(())
}

async fn run_watch(cli: &Cli, config: ReplicaConfig, board: &str) -> Result<(), CliError> {
    let session = join(cli, config, board).await?;
    let mut events = session.subscribe();
    for (id, shape) in session.snapshot().await? {
        println!("object {id} {}", serde_json::to_string(&shape)?);
    }

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&session, event).await?,
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    session.shutdown().await?;
    Ok(())
}

async fn print_event(session: &SessionHandle, event: SessionEvent) -> Result<(), CliError> {
    match event {
        SessionEvent::Status(status) => println!("status {status:?}"),
        SessionEvent::Peers(peers) => {
            let names: Vec<String> = peers
                .iter()
                .map(|p| match p.cursor {
                    Some(c) => format!("{} ({}) @ {:.0},{:.0}", p.display_name, p.peer_id, c.x, c.y),
                    None => format!("{} ({})", p.display_name, p.peer_id),
                })
                .collect();
            println!("peers [{}]", names.join(", "));
        }
        SessionEvent::Remote(changes) => {
            let objects = session.snapshot().await?;
            for change in changes {
                match change {
                    SceneChange::Materialized(id) | SceneChange::Updated(id) => {
                        if let Some((_, shape)) = objects.iter().find(|(oid, _)| *oid == id) {
                            println!("object {id} {}", serde_json::to_string(shape)?);
                        }
                    }
                    SceneChange::Removed(id) => println!("removed {id}"),
                }
            }
        }
        SessionEvent::Saved { objects } => tracing::debug!(objects, "board saved"),
    }
    Ok(())
}

async fn run_export(cli: &Cli, config: ReplicaConfig, args: &ExportArgs) -> Result<(), CliError> {
    let session = join(cli, config, &args.board).await?;
    let mut events = session.subscribe();
    let settle = Duration::from_millis(args.settle_ms);
    // Wait for the bootstrap burst to go quiet.
    while let Ok(event) = timeout(settle, events.recv()).await {
        if matches!(event, Err(RecvError::Closed)) {
            break;
        }
    }

    let document = SceneDocument::new(session.snapshot().await?);
    let rendered = serde_json::to_string_pretty(&document)?;
    match &args.output {
        Some(path) => std::fs::write(path, rendered)?,
        None => println!("{rendered}"),
    }
    session.shutdown().await?;
    Ok(())
}

/// Spawn a session for `board` and wait for its first bootstrap.
async fn join(cli: &Cli, config: ReplicaConfig, board: &str) -> Result<SessionHandle, CliError> {
    let mut identity = random_identity(random_peer_id());
    if let Some(name) = &cli.name {
        identity.display_name.clone_from(name);
    }
    let backend: Option<Arc<dyn PersistenceBackend>> = if cli.no_save {
        None
    } else {
        Some(Arc::new(JsonFileBackend::new(&config.data_dir)))
    };
    let url = config.room_url(&room_name(board));

    let (session, _task) = session::spawn(config, board, MemoryScene::new(), identity, backend);
    match timeout(Duration::from_millis(cli.connect_timeout_ms), session.wait_connected()).await {
        Ok(result) => result?,
        Err(_) => {
            session.shutdown().await?;
            return Err(CliError::ConnectTimeout(url));
        }
    }
    tracing::info!(board, peer = %session.peer_id(), "joined board");
    Ok(session)
}

fn read_shapes(input: &str) -> Result<Vec<Shape>, CliError> {
    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(input)?))
    };
    let mut shapes = Vec::new();
    for line in reader.lines() {
        if let Some(shape) = parse_shape_line(&line?)? {
            shapes.push(shape);
        }
    }
    Ok(shapes)
}

/// One JSON shape per line; blank lines and `#` comments are skipped.
fn parse_shape_line(line: &str) -> Result<Option<Shape>, CliError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

fn parse_board_id(raw: &str) -> Result<String, String> {
    if is_valid_board_id(raw) {
        Ok(raw.to_owned())
    } else {
        Err(format!("`{raw}` is not a board id like happy-penguin-42"))
    }
}

fn parse_numbers<const N: usize>(raw: &str) -> Result<[f64; N], String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("expected {N} comma-separated numbers, got `{raw}`"));
    }
    let mut out = [0.0; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part.parse().map_err(|_| format!("`{part}` is not a number"))?;
    }
    Ok(out)
}

fn parse_rect(raw: &str) -> Result<Shape, String> {
    let [left, top, width, height] = parse_numbers::<4>(raw)?;
    if width <= 0.0 || height <= 0.0 {
        return Err("rect width and height must be positive".into());
    }
    Ok(Shape::rect(left, top, width, height))
}

fn parse_text(raw: &str) -> Result<Shape, String> {
    let mut parts = raw.splitn(3, ',');
    let (Some(left), Some(top), Some(label)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("expected `left,top,label`, got `{raw}`"));
    };
    let [left, top] = parse_numbers::<2>(&format!("{left},{top}"))?;
    Ok(Shape::Text(TextShape {
        transform: Transform::at(left, top),
        style: Style::default(),
        text: label.to_owned(),
        font_size: 16.0,
    }))
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
