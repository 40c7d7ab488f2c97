// Keyboard teleop: WASD move, Z/X rotate, R/F speed, H home, SPACE stop, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use omnibase_zenoh_runtime::command::CommandFrame;
use omnibase_zenoh_runtime::config::TOPIC_CMD_BASE;

const SPEEDS: [f64; 3] = [0.05, 0.15, 0.3]; // m/s
const THETA_SPEEDS: [f64; 3] = [0.5, 1.0, 2.0]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_BASE).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, H=home, SPACE=stop, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent velocity state
    let mut forward = 0.0;
    let mut strafe = 0.0;
    let mut theta = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    // Movement - update velocity and refresh timestamp
                    KeyCode::Char('w') if pressed => {
                        forward = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        forward = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        strafe = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        strafe = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    // Rotation
                    KeyCode::Char('z') if pressed => {
                        theta = THETA_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        theta = -THETA_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        info!("Speed: {}", ["LOW", "MED", "HIGH"][speed_idx]);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        info!("Speed: {}", ["LOW", "MED", "HIGH"][speed_idx]);
                    }

                    // One-shot commands
                    KeyCode::Char('h') if pressed => {
                        publisher.put(CommandFrame::home().encode()).await?;
                        info!("Sent home request");
                    }
                    KeyCode::Char(' ') if pressed => {
                        forward = 0.0;
                        strafe = 0.0;
                        theta = 0.0;
                        publisher.put(CommandFrame::stop().encode()).await?;
                    }

                    KeyCode::Char('q') if pressed => {
                        publisher.put(CommandFrame::stop().encode()).await?;
                        info!("Quitting");
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }

        // Without fresh input the base should not keep drifting
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            forward = 0.0;
            strafe = 0.0;
            theta = 0.0;
        }

        let frame = CommandFrame::constant_speed(forward, strafe, theta);
        publisher.put(frame.encode()).await?;
    }
}
