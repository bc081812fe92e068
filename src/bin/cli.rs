// Proctor Server CLI
// Operator tool for driving exam sessions and watching live updates

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Parser)]
#[command(name = "proctor-cli")]
#[command(about = "Proctor Server operator CLI", long_about = None)]
struct Cli {
    /// Server address (default: 127.0.0.1:8080)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// Create a session as examiner
    Create {
        /// Session display name
        #[arg(short, long)]
        name: String,

        /// Examiner host ID
        #[arg(long)]
        host_id: String,

        /// Admin secret required for every later change
        #[arg(long)]
        secret: String,
    },

    /// List every session
    List,

    /// Show one session
    Get {
        code: String,
    },

    /// Join a session as a participant
    Join {
        code: String,

        #[arg(short, long)]
        user_id: String,

        #[arg(short = 'n', long, default_value = "")]
        username: String,

        /// Registration number
        #[arg(short, long, default_value = "")]
        reg_no: String,

        /// Question set label
        #[arg(long, default_value = "")]
        set: String,
    },

    /// Start a waiting session
    Start {
        code: String,

        #[arg(long)]
        secret: String,
    },

    /// Change session fields; omitted flags stay as they are
    Update {
        code: String,

        #[arg(long)]
        secret: String,

        #[arg(short, long)]
        name: Option<String>,

        /// Allotted time in minutes (0 = unbounded)
        #[arg(short, long)]
        minutes: Option<u64>,

        #[arg(long, value_enum)]
        state: Option<StateArg>,

        /// Question set as LABEL=URL, repeatable; replaces all sets
        #[arg(long = "set", value_name = "LABEL=URL")]
        sets: Vec<String>,
    },

    /// Set a participant's status
    Status {
        code: String,

        #[arg(long)]
        secret: String,

        #[arg(short, long)]
        user_id: String,

        #[arg(value_enum)]
        status: StatusArg,
    },

    /// Run the forbidden-process scan on the server host
    Scan,

    /// Subscribe over the websocket and print pushed updates
    Watch {
        /// Session codes to watch; the session list when none given
        codes: Vec<String>,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StateArg {
    Waiting,
    Active,
    NetworkLoss,
    Paused,
    Complete,
}

impl StateArg {
    fn wire(self) -> &'static str {
        match self {
            StateArg::Waiting => "Waiting",
            StateArg::Active => "Active",
            StateArg::NetworkLoss => "NetworkLoss",
            StateArg::Paused => "Paused",
            StateArg::Complete => "Complete",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Online,
    Offline,
    Submitted,
    Flagged,
}

impl StatusArg {
    fn wire(self) -> &'static str {
        match self {
            StatusArg::Online => "Online",
            StatusArg::Offline => "Offline",
            StatusArg::Submitted => "Submitted",
            StatusArg::Flagged => "Flagged",
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let server = cli.server.as_str();

    match cli.command {
        Commands::Health => check_health(server).await,
        Commands::Create { name, host_id, secret } => {
            println!("{}", "Creating session...".cyan());
            let body = json!({ "name": name, "hostId": host_id, "secret": secret });
            if let Some(resp) = request(server, reqwest::Method::POST, "/sessions", Some(body)).await {
                let code = resp["code"].as_str().unwrap_or("unknown");
                println!("\n{}", "═".repeat(50).green());
                println!("{} {}", "Session code:".bold(), code.green().bold());
                println!("{}", "═".repeat(50).green());
                if resp["persisted"] == false {
                    println!("{} Session was not saved to disk", "⚠".yellow());
                }
            }
        }
        Commands::List => {
            if let Some(resp) = request(server, reqwest::Method::GET, "/sessions", None).await {
                print_session_list(&resp);
            }
        }
        Commands::Get { code } => {
            let path = format!("/sessions/{}", code);
            if let Some(resp) = request(server, reqwest::Method::GET, &path, None).await {
                print_session(&resp);
            }
        }
        Commands::Join { code, user_id, username, reg_no, set } => {
            let path = format!("/sessions/{}/join", code);
            let body = json!({
                "userId": user_id,
                "username": username,
                "regNo": reg_no,
                "selectedSet": set,
            });
            if let Some(resp) = request(server, reqwest::Method::POST, &path, Some(body)).await {
                let id = resp["participantId"].as_str().unwrap_or("unknown");
                if resp["alreadyJoined"] == true {
                    println!("{} Already in session, participant ID {}", "✓".yellow(), id.bold());
                } else {
                    println!("{} Joined, participant ID {}", "✓".green(), id.bold());
                }
            }
        }
        Commands::Start { code, secret } => {
            let path = format!("/sessions/{}/start", code);
            if let Some(resp) =
                request(server, reqwest::Method::POST, &path, Some(json!({ "secret": secret }))).await
            {
                println!("  Start: {}", resp["startTime"].as_str().unwrap_or("-"));
                println!("  End:   {}", resp["endTime"].as_str().unwrap_or("unbounded"));
            }
        }
        Commands::Update { code, secret, name, minutes, state, sets } => {
            let mut body = json!({ "secret": secret });
            if let Some(name) = name {
                body["name"] = json!(name);
            }
            if let Some(minutes) = minutes {
                body["timeAllocatedSecs"] = json!(minutes * 60);
            }
            if let Some(state) = state {
                body["state"] = json!(state.wire());
            }
            if !sets.is_empty() {
                match parse_sets(&sets) {
                    Some(parsed) => body["sets"] = parsed,
                    None => {
                        println!("{} Sets must look like LABEL=URL", "✗".red());
                        return;
                    }
                }
            }
            let path = format!("/sessions/{}", code);
            request(server, reqwest::Method::PATCH, &path, Some(body)).await;
        }
        Commands::Status { code, secret, user_id, status } => {
            let path = format!("/sessions/{}/status", code);
            let body = json!({ "secret": secret, "userId": user_id, "status": status.wire() });
            request(server, reqwest::Method::POST, &path, Some(body)).await;
        }
        Commands::Scan => {
            if let Some(resp) = request(server, reqwest::Method::GET, "/scan", None).await {
                if resp["forbiddenDetected"] == true {
                    println!("{} Forbidden applications running:", "✗".red());
                    for m in resp["matches"].as_array().into_iter().flatten() {
                        println!("  - {}", m.as_str().unwrap_or("?").red());
                    }
                } else {
                    println!("{} No forbidden applications found", "✓".green());
                }
            }
        }
        Commands::Watch { codes, duration } => watch(server, &codes, duration).await,
    }
}

/// Sends one request and prints the outcome. Returns the body on success.
async fn request(server: &str, method: reqwest::Method, path: &str, body: Option<Value>) -> Option<Value> {
    let url = format!("http://{}{}", server, path);
    let client = reqwest::Client::new();
    let mut builder = client.request(method, &url);
    if let Some(body) = body {
        builder = builder.json(&body);
    }

    match builder.send().await {
        Ok(resp) => {
            let status = resp.status();
            let body = resp.json::<Value>().await.unwrap_or(Value::Null);
            if status.is_success() {
                if let Some(message) = body["message"].as_str() {
                    println!("{} {}", "✓".green(), message);
                }
                Some(body)
            } else {
                let reason = body["error"].as_str().unwrap_or("unknown error");
                println!("{} {} ({})", "✗".red(), reason, status);
                None
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
            None
        }
    }
}

async fn check_health(server: &str) {
    println!("{}", "Checking server health...".cyan());

    if let Some(body) = request(server, reqwest::Method::GET, "/health", None).await {
        println!("{} Health check passed", "✓".green());
        println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
        println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
        println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
        println!("  Viewers: {}", body["viewers"]);
    }
}

fn parse_sets(raw: &[String]) -> Option<Value> {
    let mut sets = serde_json::Map::new();
    for entry in raw {
        let (label, url) = entry.split_once('=')?;
        sets.insert(label.trim().to_string(), json!(url.trim()));
    }
    Some(Value::Object(sets))
}

fn print_session_list(list: &Value) {
    let sessions = list.as_array().cloned().unwrap_or_default();
    if sessions.is_empty() {
        println!("{}", "No sessions".yellow());
        return;
    }

    println!("{:<8} {:<12} {:<24} {}", "CODE".bold(), "STATE".bold(), "NAME".bold(), "PARTICIPANTS".bold());
    for s in &sessions {
        println!(
            "{:<8} {:<12} {:<24} {}",
            s["code"].as_str().unwrap_or("?").green(),
            s["state"].as_str().unwrap_or("?"),
            s["name"].as_str().unwrap_or(""),
            s["participants"].as_array().map(|p| p.len()).unwrap_or(0)
        );
    }
}

fn print_session(s: &Value) {
    println!("{} {}", "Session".bold(), s["code"].as_str().unwrap_or("?").green().bold());
    println!("  Name:  {}", s["name"].as_str().unwrap_or(""));
    println!("  Host:  {}", s["hostId"].as_str().unwrap_or(""));
    println!("  State: {}", s["state"].as_str().unwrap_or("?"));
    println!("  Start: {}", s["startTime"].as_str().unwrap_or("-"));
    println!("  End:   {}", s["endTime"].as_str().unwrap_or("-"));

    let participants = s["participants"].as_array().cloned().unwrap_or_default();
    println!("\n{} ({})", "Participants".bold(), participants.len());
    for p in &participants {
        let status = p["status"].as_str().unwrap_or("?");
        let status = match status {
            "Flagged" => status.red(),
            "Offline" => status.yellow(),
            "Submitted" => status.cyan(),
            _ => status.green(),
        };
        println!(
            "  {:<12} {:<20} {:<10} {}",
            p["userId"].as_str().unwrap_or(""),
            p["username"].as_str().unwrap_or(""),
            p["regNo"].as_str().unwrap_or(""),
            status
        );
    }
}

async fn watch(server: &str, codes: &[String], duration: Option<u64>) {
    let url = format!("ws://{}/ws", server);

    let (ws_stream, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let subscriptions: Vec<Value> = if codes.is_empty() {
        vec![json!({ "action": "subscribeAll" })]
    } else {
        codes
            .iter()
            .map(|code| json!({ "action": "subscribeSession", "sessionCode": code }))
            .collect()
    };
    for sub in subscriptions {
        if write.send(Message::Text(sub.to_string())).await.is_err() {
            println!("{} Failed to send subscription", "✗".red());
            return;
        }
    }

    println!("{} Watching {}", "✓".green(), if codes.is_empty() { "session list".to_string() } else { codes.join(", ") });
    println!("Press {} to stop.", "Ctrl+C".bold());

    let listen = async {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    for line in text.lines() {
                        print_notification(line);
                    }
                }
                Ok(Message::Close(_)) => {
                    println!("{} Server closed the connection", "✗".yellow());
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    println!("{} Connection error: {}", "✗".red(), e);
                    break;
                }
            }
        }
    };

    match duration {
        Some(secs) => {
            let _ = timeout(Duration::from_secs(secs), listen).await;
        }
        None => {
            tokio::select! {
                _ = listen => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
    }
}

fn print_notification(line: &str) {
    let Ok(n) = serde_json::from_str::<Value>(line) else {
        println!("{} {}", "◀".green(), line.bright_white());
        return;
    };

    match n["type"].as_str() {
        Some("ListChanged") => println!("{} session list changed", "◀".green()),
        Some("SessionChanged") => {
            let payload = &n["payload"];
            println!(
                "{} {} {} ({} participants)",
                "◀".green(),
                payload["code"].as_str().unwrap_or("?").bold(),
                payload["state"].as_str().unwrap_or("?"),
                payload["participants"].as_array().map(|p| p.len()).unwrap_or(0)
            );
        }
        _ => println!("{} {}", "◀".green(), line.bright_white()),
    }
}
