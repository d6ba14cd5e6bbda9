mod error;

use clap::{Parser, Subcommand, ValueEnum};
use error::CliError;
use reqwest::{Client, Method};
use serde_json::{Value, json};

/// Robot Control Panel CLI
#[derive(Parser, Debug)]
#[command(version, about = "Robot Control Panel CLI", long_about = None)]
struct Args {
    /// Base URL of the control panel API
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Show connection state, controls, servos and uptime
    Status,

    /// Show the latest telemetry sample
    Telemetry,

    /// Connect to the robot
    Connect,

    /// Disconnect from the robot
    Disconnect,

    /// Connect when disconnected, disconnect otherwise
    Toggle,

    /// Send a robot command
    Command {
        #[arg(value_enum)]
        command: RobotCommand,
    },

    /// Move a servo
    Servo {
        /// Servo to move, `servo1` to `servo4` (or `1` to `4`)
        id: String,
        /// Target angle in degrees
        #[arg(value_parser = clap::value_parser!(u16).range(0..=180))]
        position: u16,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq)]
enum RobotCommand {
    Start,
    Stop,
    Calibrate,
    Reset,
}

impl RobotCommand {
    fn name(self) -> &'static str {
        match self {
            RobotCommand::Start => "start",
            RobotCommand::Stop => "stop",
            RobotCommand::Calibrate => "calibrate",
            RobotCommand::Reset => "reset",
        }
    }
}

/// Method, path and optional JSON body of the API call behind a command.
fn route(command: &Commands) -> (Method, String, Option<Value>) {
    match command {
        Commands::Status => (Method::GET, "/status".into(), None),
        Commands::Telemetry => (Method::GET, "/telemetry".into(), None),
        Commands::Connect => (Method::POST, "/connect".into(), None),
        Commands::Disconnect => (Method::POST, "/disconnect".into(), None),
        Commands::Toggle => (Method::POST, "/toggle".into(), None),
        Commands::Command { command } => (
            Method::POST,
            "/command".into(),
            Some(json!({ "command": command.name() })),
        ),
        Commands::Servo { id, position } => (
            Method::POST,
            format!("/servo/{}", id),
            Some(json!({ "position": position })),
        ),
    }
}

async fn run(client: &Client, base_url: &str, command: &Commands) -> Result<Value, CliError> {
    let (method, path, body) = route(command);
    let url = format!("{}{}", base_url.trim_end_matches('/'), path);
    log::debug!("{} {}", method, url);

    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let text = response.text().await?;

        return Err(CliError::Api {
            status: status.as_u16(),
            message: error_message(&text, status.canonical_reason()),
        });
    }

    Ok(response.json().await?)
}

/// The panel's `{"message": ...}` when there is one, else the raw body.
fn error_message(body: &str, reason: Option<&str>) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(message) = json["message"].as_str() {
            return message.to_owned();
        }
    }

    match body.trim() {
        "" => reason.unwrap_or("no details").to_owned(),
        text => text.to_owned(),
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let client = Client::new();

    match run(&client, &args.url, &args.command).await {
        Ok(body) => match serde_json::to_string_pretty(&body) {
            Ok(text) => println!("{}", text),
            Err(_) => println!("{}", body),
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use clap::CommandFactory;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_commands_and_servo_moves() {
        let args = Args::try_parse_from(["panel-cli", "command", "calibrate"]).unwrap();
        assert_eq!(args.url, "http://127.0.0.1:3000");
        assert_eq!(
            args.command,
            Commands::Command {
                command: RobotCommand::Calibrate
            }
        );

        let args =
            Args::try_parse_from(["panel-cli", "--url", "http://robot:8080", "servo", "servo2", "135"])
                .unwrap();
        assert_eq!(args.url, "http://robot:8080");
        assert_eq!(
            args.command,
            Commands::Servo {
                id: "servo2".into(),
                position: 135
            }
        );
    }

    #[test]
    fn rejects_unknown_commands_and_wild_angles() {
        assert!(Args::try_parse_from(["panel-cli", "command", "dance"]).is_err());
        assert!(Args::try_parse_from(["panel-cli", "servo", "servo1", "181"]).is_err());
    }

    #[test]
    fn routes_match_the_api() {
        let (method, path, body) = route(&Commands::Toggle);
        assert_eq!((method, path.as_str(), body), (Method::POST, "/toggle", None));

        let (method, path, body) = route(&Commands::Command {
            command: RobotCommand::Reset,
        });
        assert_eq!(method, Method::POST);
        assert_eq!(path, "/command");
        assert_eq!(body, Some(json!({"command": "reset"})));

        let (_, path, body) = route(&Commands::Servo {
            id: "3".into(),
            position: 0,
        });
        assert_eq!(path, "/servo/3");
        assert_eq!(body, Some(json!({"position": 0})));
    }

    async fn fake_panel() -> SocketAddr {
        let app = Router::new()
            .route(
                "/connect",
                post(|| async { Json(json!({"state": "connecting"})) }),
            )
            .route(
                "/command",
                post(|| async {
                    (
                        StatusCode::CONFLICT,
                        Json(json!({"status": "error", "message": "Not connected"})),
                    )
                }),
            )
            .route(
                "/servo/{id}",
                post(|| async {
                    (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "Failed to deserialize the JSON body",
                    )
                }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        addr
    }

    #[tokio::test]
    async fn prints_body_on_success_and_fails_on_error_status() {
        let addr = fake_panel().await;
        let base = format!("http://{}/", addr);
        let client = Client::new();

        let body = run(&client, &base, &Commands::Connect).await.unwrap();
        assert_eq!(body["state"], "connecting");

        let err = run(
            &client,
            &base,
            &Commands::Command {
                command: RobotCommand::Start,
            },
        )
        .await
        .unwrap_err();
        match err {
            CliError::Api { status, message } => {
                assert_eq!(status, 409);
                assert_eq!(message, "Not connected");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn keeps_the_status_of_non_json_errors() {
        let addr = fake_panel().await;
        let base = format!("http://{}", addr);
        let client = Client::new();

        // No such route: empty 404 body.
        match run(&client, &base, &Commands::Toggle).await.unwrap_err() {
            CliError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Not Found");
            }
            other => panic!("unexpected error: {}", other),
        }

        let servo = Commands::Servo {
            id: "servo1".into(),
            position: 90,
        };
        match run(&client, &base, &servo).await.unwrap_err() {
            CliError::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Failed to deserialize the JSON body");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn error_message_prefers_the_panel_message() {
        assert_eq!(
            error_message(r#"{"status":"error","message":"Not connected"}"#, Some("Conflict")),
            "Not connected"
        );
        assert_eq!(error_message("  ", Some("Bad Gateway")), "Bad Gateway");
        assert_eq!(error_message("", None), "no details");
        assert_eq!(error_message(r#"{"other":1}"#, None), r#"{"other":1}"#);
    }
}
