//! Lovelink Demo
//!
//! Runs the library against the in-memory controller bus:
//! - One-shot reads and writes through `LoveClient`
//! - Bound sessions through `LinkManager`, with the diagnostic report
//! - Concurrent callers sharing one port
//!
//! With the `serial` feature, a device path polls a real 1600 controller
//! at address 1 instead.
//!
//! Usage: cargo run --bin demo
//!        cargo run --features serial --bin demo -- /dev/ttyUSB0 9600

use std::sync::Arc;

use lovelink::sim::{Fault, SimController, SimulatedBus};
use lovelink::{
    Command, ControllerModel, Direction, LinkManager, LoveClient, LovePort, PortConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", lovelink::info());
    println!("==============================\n");

    #[cfg(feature = "serial")]
    if let Some(path) = std::env::args().nth(1) {
        let baud = std::env::args()
            .nth(2)
            .map(|b| b.parse::<u32>())
            .transpose()?
            .unwrap_or(9600);
        return poll_serial(&path, baud).await;
    }

    let bus = SimulatedBus::new();
    bus.add_controller(
        1,
        SimController::new(ControllerModel::M1600)
            .with_decimal_points(1)
            .with_process_value(72.4),
    );
    bus.add_controller(
        2,
        SimController::new(ControllerModel::M16A)
            .with_decimal_points(2)
            .with_process_value(-3.25),
    );

    // =========================================================================
    // Part 1: One-shot client
    // =========================================================================
    println!("Part 1: LoveClient");
    println!("------------------");

    let port = Arc::new(LovePort::new(
        "L0",
        bus.clone(),
        PortConfig::default().with_packet_logging(true),
    )?);
    let client = LoveClient::from_port(Arc::clone(&port));

    let pv = client.get_value(1, ControllerModel::M1600).await?;
    println!("  1600 @0x01 process value: {}", pv);

    client.put_setpoint1(1, ControllerModel::M1600, 75.0).await?;
    println!(
        "  1600 @0x01 setpoint 1 now: {}",
        client.get_setpoint1(1, ControllerModel::M1600).await?
    );

    let pv = client.get_value(2, ControllerModel::M16A).await?;
    println!("  16A  @0x02 process value: {}", pv);
    println!(
        "  16A  @0x02 remote: {}",
        client.get_comm_status(2, ControllerModel::M16A).await?
    );

    // =========================================================================
    // Part 2: Error handling
    // =========================================================================
    println!("\nPart 2: Errors and retries");
    println!("--------------------------");

    bus.inject(Fault::ReadTimeout);
    let pv = client.get_value(2, ControllerModel::M16A).await?;
    println!("  one lost response, retried: {}", pv);

    bus.inject(Fault::ErrorCode(3));
    match client.get_peak(2, ControllerModel::M16A).await {
        Ok(v) => println!("  unexpected success: {}", v),
        Err(e) => println!("  controller error: {} (status {})", e, e.status()),
    }

    match client.get_value(9, ControllerModel::M16A).await {
        Ok(v) => println!("  unexpected success: {}", v),
        Err(e) => println!("  silent address: {} (status {})", e, e.status()),
    }

    // =========================================================================
    // Part 3: Bound sessions
    // =========================================================================
    println!("\nPart 3: LinkManager");
    println!("-------------------");

    let manager = LinkManager::new();
    manager.add_port(LovePort::new("L1", bus.clone(), PortConfig::default())?)?;

    let mut pv1 = manager.bind("L1", 1, Command::GetValue, ControllerModel::M1600, Direction::Read, "OVEN:PV")?;
    let mut sp1 = manager.bind("L1", 1, Command::PutSp1, ControllerModel::M1600, Direction::Write, "OVEN:SP")?;
    let mut pv2 = manager.bind_by_name("L1", 2, "getValue", "16A", Direction::Read, "BATH:PV")?;
    let mut al2 = manager.bind_by_name("L1", 2, "getAlStatus", "16A", Direction::Read, "BATH:ALARM")?;

    sp1.transact(Some(80.5)).await?;

    // concurrent callers on one port take turns on the wire
    let (a, b, c) = tokio::join!(pv1.transact(None), pv2.transact(None), al2.transact(None));
    println!("  OVEN:PV    {}", a?);
    println!("  BATH:PV    {}", b?);
    println!("  BATH:ALARM {}", c?);

    println!("\n{}", manager.report(2));

    let stats = port.stats().await;
    println!(
        "Bus statistics: {} requests, {} responses, {} timeouts",
        stats.requests_sent, stats.responses_received, stats.timeouts
    );

    println!("\nDemo complete");
    Ok(())
}

#[cfg(feature = "serial")]
async fn poll_serial(path: &str, baud: u32) -> Result<(), Box<dyn std::error::Error>> {
    use lovelink::{SerialSettings, SerialTransport};

    let transport = SerialTransport::open(SerialSettings::new(path, baud))?;
    let client = LoveClient::new(
        "L0",
        transport,
        PortConfig::serial_default().with_packet_logging(true),
    )?;

    for _ in 0..10 {
        match client.get_value(1, ControllerModel::M1600).await {
            Ok(pv) => println!("process value: {}", pv),
            Err(e) => println!("read failed: {} ({})", e, e.status()),
        }
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }

    client.close().await?;
    Ok(())
}
