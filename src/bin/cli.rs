use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};

const TOKEN_FILE: &str = ".taskboard_token";

#[derive(Parser)]
#[command(name = "taskboard-cli")]
#[command(about = "CLI for the task board server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, env = "TASKBOARD_URL", default_value = "http://localhost:8000")]
    url: String,

    /// Bearer token; defaults to the one saved by `login`/`signup`.
    #[arg(long, env = "TASKBOARD_TOKEN")]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    Signup {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    Boards,
    CreateBoard {
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        background: Option<String>,
    },
    DeleteBoard {
        #[arg(short, long)]
        id: u64,
    },
    Containers {
        #[arg(short, long)]
        board: u64,
    },
    CreateContainer {
        #[arg(short, long)]
        board: u64,
        #[arg(short, long)]
        title: String,
    },
    Tasks {
        #[arg(short, long)]
        container: u64,
    },
    CreateTask {
        #[arg(short, long)]
        container: u64,
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    UserData,
    /// Replace a board's containers and tasks with the snapshot in a JSON file.
    Sync {
        #[arg(short, long)]
        file: PathBuf,
    },
    ReserveIds {
        #[arg(short, long, default_value_t = 10)]
        count: u64,
    },
    Logout,
}

#[derive(Deserialize)]
struct AuthResponse {
    id: u64,
    username: String,
    token: String,
}

fn with_token(builder: RequestBuilder, token: &Option<String>) -> RequestBuilder {
    let token = token
        .clone()
        .or_else(|| fs::read_to_string(TOKEN_FILE).ok())
        .unwrap_or_default();
    builder.bearer_auth(token.trim())
}

async fn print_response(res: Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => println!("{status}\n{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{status} {text}"),
    }
    Ok(())
}

async fn save_login(res: Response) -> Result<(), Box<dyn std::error::Error>> {
    if res.status().is_success() {
        let body: AuthResponse = res.json().await?;
        fs::write(TOKEN_FILE, &body.token)?;
        println!("Logged in as {} (id {}). Token saved to {TOKEN_FILE}", body.username, body.id);
    } else {
        print_response(res).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let url = cli.url.trim_end_matches('/');
    let token = &cli.token;

    match cli.command {
        Commands::Signup { username, email, password } => {
            let res = client
                .post(format!("{url}/signup"))
                .json(&json!({ "username": username, "email": email, "password": password }))
                .send()
                .await?;
            save_login(res).await?;
        }
        Commands::Login { username, password } => {
            let res = client
                .post(format!("{url}/login"))
                .json(&json!({ "username": username, "password": password }))
                .send()
                .await?;
            save_login(res).await?;
        }
        Commands::Boards => {
            let res = with_token(client.get(format!("{url}/boards")), token).send().await?;
            print_response(res).await?;
        }
        Commands::CreateBoard { title, background } => {
            let mut body = json!({ "title": title });
            if let Some(background) = background {
                body["background"] = json!(background);
            }
            let res = with_token(client.post(format!("{url}/boards")), token)
                .json(&body)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::DeleteBoard { id } => {
            let res = with_token(client.delete(format!("{url}/boards/{id}")), token)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Containers { board } => {
            let res = with_token(client.get(format!("{url}/boards/{board}/containers")), token)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::CreateContainer { board, title } => {
            let res = with_token(client.post(format!("{url}/boards/{board}/containers")), token)
                .json(&json!({ "title": title }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Tasks { container } => {
            let res = with_token(client.get(format!("{url}/containers/{container}/tasks")), token)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::CreateTask { container, title, description } => {
            let res = with_token(client.post(format!("{url}/containers/{container}/tasks")), token)
                .json(&json!({ "title": title, "description": description, "completed": false }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::UserData => {
            let res = with_token(client.get(format!("{url}/user-data")), token).send().await?;
            print_response(res).await?;
        }
        Commands::Sync { file } => {
            let snapshot: Value = serde_json::from_str(&fs::read_to_string(&file)?)?;
            let res = with_token(client.post(format!("{url}/update-user-data")), token)
                .json(&snapshot)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::ReserveIds { count } => {
            let res = with_token(client.post(format!("{url}/ids")), token)
                .json(&json!({ "count": count }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Logout => {
            let res = with_token(client.post(format!("{url}/logout")), token).send().await?;
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Logged out ({}); token removed.", res.status());
        }
    }

    Ok(())
}
