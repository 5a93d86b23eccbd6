use clap::Parser;
use shared::framing::FrameBuffer;
use shared::protocol::{ClientMessage, ServerMessage};
use shared::{Color, DEFAULT_PORT};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

/// Headless client that joins the arena, walks around and fires once
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Username to announce after joining
    #[clap(short, long, default_value = "testclient")]
    username: String,
    /// Number of moves to send
    #[clap(short, long, default_value_t = 5)]
    moves: u32,
    /// Seconds to keep printing incoming messages after the script is done
    #[clap(long, default_value_t = 3)]
    linger_secs: u64,
}

async fn send(writer: &mut OwnedWriteHalf, message: &ClientMessage) -> Result<(), Box<dyn std::error::Error>> {
    writer.write_all(message.to_frame()?.as_bytes()).await?;
    println!("-> {:?}", message);
    Ok(())
}

fn print_message(message: &ServerMessage) {
    match message {
        ServerMessage::GameState { players } => {
            println!("<- snapshot with {} players", players.len());
            for player in players {
                println!(
                    "     {} '{}' at ({}, {}) rot {:.1} colour {}",
                    player.id,
                    player.username,
                    player.x,
                    player.y,
                    player.rot,
                    player.color.code()
                );
            }
        }
        ServerMessage::ClientId { id } => println!("<- assigned id {}", id),
        other => println!("<- {:?}", other),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    println!("Connecting to {}", address);
    let stream = TcpStream::connect(&address).await?;
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    let printer = tokio::spawn(async move {
        let mut frames = FrameBuffer::new();
        let mut buf = [0u8; 2048];
        loop {
            let len = match reader.read(&mut buf).await {
                Ok(0) => {
                    println!("Server closed the connection");
                    break;
                }
                Ok(len) => len,
                Err(e) => {
                    println!("Read error: {}", e);
                    break;
                }
            };
            let complete = match frames.push(&buf[..len]) {
                Ok(complete) => complete,
                Err(e) => {
                    println!("Framing error: {}", e);
                    break;
                }
            };
            for frame in complete {
                match ServerMessage::decode(&frame) {
                    Ok(message) => print_message(&message),
                    Err(e) => println!("Undecodable message {:?}: {}", frame, e),
                }
            }
        }
    });

    // Give the welcome sequence time to arrive
    sleep(Duration::from_millis(200)).await;

    send(
        &mut writer,
        &ClientMessage::PlayerUpdate {
            username: args.username.clone(),
            color: Color::GREEN,
        },
    )
    .await?;

    for step in 0..args.moves {
        let offset = (step as i32 + 1) * 20;
        send(
            &mut writer,
            &ClientMessage::Move {
                x: 100 + offset,
                y: 100 + offset,
                rot: (step * 30) as f32,
            },
        )
        .await?;
        sleep(Duration::from_millis(100)).await;
    }

    send(
        &mut writer,
        &ClientMessage::BulletShot {
            x: 0,
            y: 0,
            rot: 90.0,
        },
    )
    .await?;

    if timeout(Duration::from_secs(args.linger_secs), printer).await.is_err() {
        println!("Done");
    }
    Ok(())
}
