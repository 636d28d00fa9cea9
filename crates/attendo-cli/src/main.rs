use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "attendo", about = "Attendance kiosk control CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show kiosk status (loop state, last match, last submission)
    Status,
    /// Select the class/session attendance is attributed to
    SelectSession {
        /// Session identifier (e.g., "yoga-0900")
        session_id: String,
    },
    /// Clear the selected session
    ClearSession,
    /// Refetch the roster and rebuild the matcher
    ReloadRoster,
    /// List available camera devices
    Devices,
    /// Capture one frame directly (bypasses the daemon) and save a snapshot
    Test {
        /// V4L2 device path
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Output PNG path
        #[arg(short, long, default_value = "attendo-test.png")]
        output: String,
    },
}

#[zbus::proxy(
    interface = "org.academy.Attendo1",
    default_service = "org.academy.Attendo1",
    default_path = "/org/academy/Attendo1"
)]
trait Attendo {
    async fn status(&self) -> zbus::Result<String>;
    async fn select_session(&self, session_id: &str) -> zbus::Result<()>;
    async fn clear_session(&self) -> zbus::Result<()>;
    async fn reload_roster(&self) -> zbus::Result<u32>;
}

async fn daemon_proxy() -> Result<AttendoProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("failed to connect to session bus")?;
    AttendoProxy::new(&conn)
        .await
        .context("attendod not reachable — is the daemon running?")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status => {
            let proxy = daemon_proxy().await?;
            let raw = proxy.status().await?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::SelectSession { session_id } => {
            let proxy = daemon_proxy().await?;
            proxy.select_session(&session_id).await?;
            println!("Session selected: {session_id}");
        }
        Commands::ClearSession => {
            let proxy = daemon_proxy().await?;
            proxy.clear_session().await?;
            println!("Session cleared");
        }
        Commands::ReloadRoster => {
            let proxy = daemon_proxy().await?;
            let count = proxy.reload_roster().await?;
            println!("Roster reloaded: {count} templates");
        }
        Commands::Devices => {
            let devices = attendo_hw::Camera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({})", dev.path, dev.name, dev.driver);
            }
        }
        Commands::Test { device, output } => {
            let camera = attendo_hw::Camera::open(&device)
                .with_context(|| format!("failed to open {device}"))?;
            let frame = camera.capture_frame().context("capture failed")?;
            println!(
                "Captured {}x{} frame, avg brightness {:.1}{}",
                frame.width,
                frame.height,
                frame.avg_brightness(),
                if frame.is_dark() { " (dark!)" } else { "" }
            );

            let img = image::GrayImage::from_raw(frame.width, frame.height, frame.data)
                .context("frame buffer did not match negotiated dimensions")?;
            img.save(&output)
                .with_context(|| format!("failed to save {output}"))?;
            println!("Snapshot saved to {output}");
        }
    }

    Ok(())
}
