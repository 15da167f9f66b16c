use std::error::Error;
use std::time::Duration;

use bluebus::{Session, SystemBus};
use tracing::{info, metadata::LevelFilter};

fn main() -> Result<(), Box<dyn Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let mut session = Session::new(SystemBus::new())?;

    info!("starting scan");
    session.start_discovery()?;
    let new = session.scan_for(Duration::from_secs(10));
    session.stop_discovery()?;
    info!("scan finished, {} new devices", new.len());

    for device in session.devices() {
        let name = if device.name.is_empty() { "(unknown)" } else { device.name.as_str() };
        info!("{} {}: {:?}", device.address, name, device.services);
    }

    Ok(())
}
