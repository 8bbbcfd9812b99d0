use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use reqwest::RequestBuilder;
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// Degrees of latitude per kilometre, near enough for scattering test drivers.
const DEG_PER_KM: f64 = 1.0 / 111.32;

#[derive(Parser)]
#[command(name = "dispatch-cli")]
#[command(about = "Operator and test client for the ride dispatch engine", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080", env = "DISPATCH_URL")]
    url: String,

    /// Caller token (rider or driver) for API commands.
    #[arg(short, long, env = "DISPATCH_TOKEN")]
    token: Option<String>,

    /// Admin API key for `status` and `seed`.
    #[arg(short, long, default_value = "change-me", env = "DISPATCH_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show engine status
    Status,
    /// Register N drivers scattered around a point
    Seed {
        #[arg(long, default_value_t = 10)]
        count: usize,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Scatter radius in kilometres
        #[arg(long, default_value_t = 3.0)]
        spread_km: f64,
        #[arg(long, default_value = "driver")]
        prefix: String,
    },
    /// Request a ride as a rider
    Request {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long, allow_hyphen_values = true)]
        dropoff_lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        dropoff_lng: Option<f64>,
    },
    /// Show a ride
    Ride { id: String },
    /// Report the calling driver's location
    Location {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
    /// Open the driver channel and print events as they arrive
    Listen {
        /// Accept every new ride automatically
        #[arg(long)]
        auto_accept: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/').to_string();
    let authed = |builder: RequestBuilder| match &cli.token {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    };

    match &cli.command {
        Commands::Status => {
            let res = client
                .get(format!("{base}/admin/status"))
                .bearer_auth(&cli.key)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Seed {
            count,
            lat,
            lng,
            spread_km,
            prefix,
        } => {
            let vehicles = ["Toyota Premio", "Honda Fit", "Nissan Note", "Suzuki Swift"];
            for i in 0..*count {
                let d_lat = (fastrand::f64() * 2.0 - 1.0) * spread_km * DEG_PER_KM;
                let d_lng = (fastrand::f64() * 2.0 - 1.0) * spread_km * DEG_PER_KM;
                let body = json!({
                    "driver_id": format!("{prefix}{}", i + 1),
                    "profile": {
                        "name": format!("Driver {}", i + 1),
                        "rating": 4.0 + (fastrand::f64() * 10.0).round() / 10.0,
                        "vehicle": vehicles[fastrand::usize(..vehicles.len())],
                    },
                    "position": { "lat": lat + d_lat, "lng": lng + d_lng },
                });
                let res = client
                    .post(format!("{base}/admin/drivers"))
                    .bearer_auth(&cli.key)
                    .json(&body)
                    .send()
                    .await?;
                if !res.status().is_success() {
                    eprintln!("Seeding {prefix}{} failed: {}", i + 1, res.status());
                }
            }
            println!("Seeded {count} drivers around ({lat}, {lng})");
        }
        Commands::Request {
            lat,
            lng,
            dropoff_lat,
            dropoff_lng,
        } => {
            let dropoff = match (dropoff_lat, dropoff_lng) {
                (Some(lat), Some(lng)) => json!({ "lat": lat, "lng": lng }),
                _ => Value::Null,
            };
            let res = authed(client.post(format!("{base}/v1/rides")))
                .json(&json!({ "pickup": { "lat": lat, "lng": lng }, "dropoff": dropoff }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Ride { id } => {
            let res = authed(client.get(format!("{base}/v1/rides/{id}"))).send().await?;
            print_response(res).await?;
        }
        Commands::Location { lat, lng } => {
            let res = authed(client.put(format!("{base}/v1/drivers/location")))
                .json(&json!({ "lat": lat, "lng": lng }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Listen { auto_accept } => {
            let token = cli.token.as_deref().ok_or("listen needs --token")?;
            listen(&base, token, *auto_accept).await?;
        }
    }

    Ok(())
}

async fn listen(base: &str, token: &str, auto_accept: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut url = Url::parse(base)?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme).map_err(|_| "cannot convert URL to WebSocket")?;
    url.set_path("/v1/drivers/ws");
    url.query_pairs_mut().append_pair("token", token);

    let (socket, _) = connect_async(url.as_str()).await?;
    println!("Connected to {}", url.path());
    let (mut sink, mut stream) = socket.split();

    let mut heartbeat = tokio::time::interval(std::time::Duration::from_secs(30));

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let beat = json!({ "type": "heartbeat", "time": chrono::Utc::now().to_rfc3339() });
                sink.send(Message::text(beat.to_string())).await?;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let event: Value = serde_json::from_str(text.as_str())?;
                    println!("{}", serde_json::to_string_pretty(&event)?);
                    if auto_accept {
                        if let Some(ride_id) = event.get("ride_id").and_then(Value::as_str) {
                            let accept = json!({ "type": "accept", "ride_id": ride_id });
                            sink.send(Message::text(accept.to_string())).await?;
                            println!("Accepted {ride_id}");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    println!("Channel closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
