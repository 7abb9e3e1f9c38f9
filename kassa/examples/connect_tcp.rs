//! Connect to a register and return it to mode selection

use std::time::Duration;

use kassa::CashRegister;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let ip = std::env::var("DEVICE_IP").unwrap_or_else(|_| "192.168.1.10".to_string());

    let mut register = CashRegister::tcp(ip, 5555).with_timeout(Duration::from_secs(10));
    let device = register.connect().await?;
    println!("Connected: {}", device);

    let state = register.device_state().await?;
    println!("Mode: {}.{}", state.mode, state.sub_mode);
    println!("Shift open: {}", state.is_shift_open());
    if let Some(clock) = state.clock {
        println!("Clock: {}", clock);
    }

    let result = register
        .command()
        .cancel_bill()
        .sleep(Duration::from_millis(100))
        .reset_mode()
        .execute()
        .await?;
    println!("Chain result: {}", result);

    register.disconnect().await?;
    Ok(())
}
