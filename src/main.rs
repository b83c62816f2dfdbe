use std::env;
use std::error::Error;
use std::time::Duration;

use switchboard::signaling::{SignalingClient, SignalingConfig, WebSocketConnector};
use tracing_subscriber::EnvFilter;

const DEFAULT_SIGNALING_URL: &str = "ws://127.0.0.1:8080/spreed";
const DIAL_DELAY: Duration = Duration::from_secs(1);

fn config_from_env() -> Result<SignalingConfig, Box<dyn Error>> {
    let url = env::var("SWITCHBOARD_URL").unwrap_or_else(|_| DEFAULT_SIGNALING_URL.to_string());
    let mut config = SignalingConfig::new(url)
        .with_backend_url(env::var("SWITCHBOARD_BACKEND_URL").unwrap_or_default())
        .with_ticket(env::var("SWITCHBOARD_TICKET").unwrap_or_default());

    if let Ok(user_id) = env::var("SWITCHBOARD_USER_ID") {
        config = config.with_user_id(user_id);
    }
    if let Ok(id) = env::var("SWITCHBOARD_INTERNAL_USER_ID") {
        config = config.with_internal_user_id(id.parse()?);
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config_from_env()?;

    println!("   Switchboard signaling client");
    println!("   Connecting to {}", config.url);
    println!("   Press Ctrl+C to stop\n");

    let connector = WebSocketConnector::new().with_dial_delay(DIAL_DELAY);
    let client = SignalingClient::start(config, connector)?;
    let events = client.subscribe();

    if let Ok(room) = env::var("SWITCHBOARD_ROOM") {
        let session = env::var("SWITCHBOARD_ROOM_SESSION").unwrap_or_default();
        client.join_room(room, session);
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => println!("{:?}", event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                client.shutdown();
                break;
            }
        }
    }

    Ok(())
}
