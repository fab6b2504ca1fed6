use std::sync::Arc;

use calculator::{new_net_poettering_calculator, register_net_poettering_calculator, PropertiesVariant, SimpleCalculator, State};
use sdbus_vtable::sdbus::SdBus;
use sdbus_vtable::ObjectManager;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let bus = SdBus::open_user()?;
    let _manager = ObjectManager::new(bus.clone(), "/net/poettering".into())?;
    let desc = Arc::new(register_net_poettering_calculator::<SimpleCalculator>());
    let _calc = new_net_poettering_calculator(bus.clone(), "/net/poettering/calculator".into(), desc,
        vec!(("Status".to_string(), PropertiesVariant::State(State::Success))), SimpleCalculator::new)?;
    bus.request_name(&"net.poettering.Calculator".into())?;
    tracing::info!("serving net.poettering.Calculator at /net/poettering/calculator");
    bus.run()?;
    Ok(())
}
