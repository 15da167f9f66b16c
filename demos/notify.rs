use std::error::Error;
use std::time::Duration;

use bluebus::{ServiceFilter, Session, SystemBus};
use tracing::info;
use tracing::metadata::LevelFilter;

fn main() -> Result<(), Box<dyn Error>> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let service = std::env::args().nth(1).ok_or("usage: notify <service uuid>")?;

    let mut session = Session::new(SystemBus::new())?;
    session.set_filter(ServiceFilter::new([service]));

    info!("starting scan");
    session.start_discovery()?;
    session.scan_for(Duration::from_secs(10));
    session.stop_discovery()?;

    let device_path = {
        let matching = session.filtered_devices();
        let device = matching.first().ok_or("no matching device found")?;
        let name = if device.name.is_empty() { "(unknown)" } else { device.name.as_str() };
        info!("{} {}", device.address, name);
        device.path.clone()
    };

    session.connect(&device_path)?;
    info!("connected!");

    let characteristics = session.characteristics(&device_path);
    let notifying: Vec<String> = characteristics
        .iter()
        .filter(|c| c.flags.iter().any(|f| f == "notify"))
        .map(|c| c.path.clone())
        .collect();

    session.set_notification_handler(|path, value| {
        info!("{path}: {value:02x?}");
    });
    for path in &notifying {
        session.start_notify(path)?;
        info!("subscribed to {path}");
    }

    for _ in 0..30 {
        session.pump(Duration::from_secs(1));
    }

    for path in &notifying {
        session.stop_notify(path)?;
    }
    session.disconnect(&device_path)?;
    info!("disconnected!");

    Ok(())
}
