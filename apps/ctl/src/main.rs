use anyhow::{bail, Context, Result};
use heatpump_core::controller::FREEZING_THRESHOLD;
use heatpump_core::{
    CommandExecutor, ConfirmationChoice, ConfirmationPrompt, HeatingController, HeatingStatus, HttpBackend,
    TelemetrySource, ToggleOutcome,
};
use std::env;
use std::io::{stdin, stdout, Write};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: heatpump-ctl <backend-url> (status|toggle|start|soft-start|stop|scheduling on|off)";

fn ask(prompt: &ConfirmationPrompt) -> Result<ConfirmationChoice> {
    print!("{} [y/n] ", prompt.question());
    stdout().flush()?;
    let mut answer = String::new();
    stdin().read_line(&mut answer)?;
    Ok(match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => ConfirmationChoice::Accept,
        _ => ConfirmationChoice::Decline,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Direct {
    Start,
    SoftStart,
    Stop,
}

// Direct commands follow the same rules as a toggle: no normal start in
// freezing weather, and no command that would not change the circuit.
fn check_direct(command: Direct, status: HeatingStatus, outside: Option<f64>) -> Result<()> {
    match command {
        Direct::Start | Direct::SoftStart if status.is_active() => bail!("Circuit is already {:?}", status),
        Direct::Start => match outside {
            Some(t) if t > FREEZING_THRESHOLD => Ok(()),
            Some(t) => bail!("Outside temperature is {:.1}°C, only soft-start is allowed", t),
            None => bail!("Outside temperature is unknown, only soft-start is allowed"),
        },
        Direct::SoftStart => Ok(()),
        Direct::Stop if !status.is_active() => bail!("Circuit is already stopped"),
        Direct::Stop => Ok(()),
    }
}

fn report(outcome: &ToggleOutcome) {
    match outcome {
        ToggleOutcome::Committed(state) => println!(
            "Circuit {:?}, scheduling {}",
            state.status,
            if state.scheduling_enabled { "on" } else { "off" }
        ),
        ToggleOutcome::NeedsConfirmation(prompt) => println!("{}", prompt.question()),
        ToggleOutcome::Declined => println!("Nothing changed"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!(USAGE);
    }
    let token = env::var("HEATPUMP_TOKEN").ok();
    let backend = HttpBackend::new(&args[1], token, Duration::from_secs(10))
        .with_context(|| format!("Bad backend url {}", args[1]))?;

    let mut controller = HeatingController::new();
    controller
        .refresh(&backend)
        .await
        .context("Failed to read circuit state")?;

    match args[2].as_str() {
        "status" => {
            let state = controller.state();
            println!(
                "Circuit {:?}, scheduling {}",
                state.status,
                if state.scheduling_enabled { "on" } else { "off" }
            );
            if let Some(sample) = backend.fetch_latest().await? {
                println!(
                    "{}: outside {:.1}°C, inside {:.1}°C, lower tank {:.1}°C, upper tank {:.1}°C",
                    sample.time, sample.outside_temp, sample.inside_temp, sample.lower_tank_temp, sample.upper_tank_temp
                );
            }
        }
        "toggle" => {
            let outside = backend.fetch_latest().await?.map(|s| s.outside_temp);
            let mut outcome = controller.toggle(&backend, outside).await?;
            if let ToggleOutcome::NeedsConfirmation(prompt) = outcome {
                let choice = ask(&prompt)?;
                outcome = controller.confirm(&backend, choice).await?;
            }
            report(&outcome);
        }
        "start" | "soft-start" | "stop" => {
            let command = match args[2].as_str() {
                "start" => Direct::Start,
                "soft-start" => Direct::SoftStart,
                _ => Direct::Stop,
            };
            let outside = backend.fetch_latest().await?.map(|s| s.outside_temp);
            check_direct(command, controller.status(), outside)?;
            let status = match command {
                Direct::Start => backend.start_circuit(false).await?,
                Direct::SoftStart => backend.start_circuit(true).await?,
                Direct::Stop => backend.stop_circuit().await?,
            };
            println!("Circuit {:?}", status);
        }
        "scheduling" => {
            let enabled = match args.get(3).map(String::as_str) {
                Some("on") => true,
                Some("off") => false,
                _ => bail!(USAGE),
            };
            let state = controller.set_scheduling(&backend, enabled).await?;
            println!("Circuit {:?}, scheduling {}", state.status, if enabled { "on" } else { "off" });
        }
        other => bail!("Unknown command: {}\n{}", other, USAGE),
    }
    Ok(())
}
