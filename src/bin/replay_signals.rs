use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use centinela::csv_loader::load_signal_trace;
use centinela::delay_confirm::{DelayConfirm, DelayConfirmParams, FallState};
use centinela::events::{
    FallEvent, FallObserver, ObserverError, SuspectedEvent, SuspectedObserver,
};

struct ReplayOptions {
    delay_sec: f64,
    re_notify_interval: f64,
}

fn parse_args() -> Result<(PathBuf, ReplayOptions)> {
    let mut delay_sec = 3.0;
    let mut re_notify_interval = 120.0;
    let mut csv_path: Option<PathBuf> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--delay" => {
                delay_sec = args
                    .next()
                    .ok_or_else(|| anyhow!("--delay requiere un valor"))?
                    .parse()?;
            }
            "--re-notify" => {
                re_notify_interval = args
                    .next()
                    .ok_or_else(|| anyhow!("--re-notify requiere un valor"))?
                    .parse()?;
            }
            _ => {
                if csv_path.is_some() {
                    bail!("Uso: replay_signals [--delay S] [--re-notify S] <traza.csv>");
                }
                csv_path = Some(PathBuf::from(arg));
            }
        }
    }

    let csv_path = csv_path.ok_or_else(|| anyhow!("Debes especificar una traza CSV"))?;
    Ok((
        csv_path,
        ReplayOptions {
            delay_sec,
            re_notify_interval,
        },
    ))
}

/// Contador de ciclo de vida para el resumen final
#[derive(Default)]
struct Tally {
    suspected: u32,
    cleared: u32,
    confirmed: u32,
    notifications: u32,
    recovered: u32,
}

#[derive(Clone)]
struct Printer(Arc<Mutex<Tally>>);

impl FallObserver for Printer {
    fn on_fall_confirmed(&mut self, event: &FallEvent) -> Result<(), ObserverError> {
        let mut tally = self.0.lock().unwrap();
        tally.notifications += 1;
        if event.notification_count == 1 {
            tally.confirmed += 1;
        }
        println!(
            "  t={:>8.2}  🚨 confirmada {} (aviso #{})",
            event.last_notified_at, event.event_id, event.notification_count
        );
        Ok(())
    }

    fn on_fall_recovered(&mut self, event: &FallEvent) -> Result<(), ObserverError> {
        self.0.lock().unwrap().recovered += 1;
        println!("             ✅ recuperada {}", event.event_id);
        Ok(())
    }
}

impl SuspectedObserver for Printer {
    fn on_fall_suspected(&mut self, event: &SuspectedEvent) -> Result<(), ObserverError> {
        self.0.lock().unwrap().suspected += 1;
        println!(
            "  t={:>8.2}  ⚠️  sospecha {}",
            event.suspected_at, event.suspected_id
        );
        Ok(())
    }

    fn on_suspicion_cleared(&mut self, event: &SuspectedEvent) -> Result<(), ObserverError> {
        self.0.lock().unwrap().cleared += 1;
        println!(
            "  t={:>8.2}  💨 descartada {}",
            event.outcome_at.unwrap_or(0.0),
            event.suspected_id
        );
        Ok(())
    }

    fn on_fall_confirmed_update(&mut self, _event: &SuspectedEvent) -> Result<(), ObserverError> {
        Ok(())
    }
}

fn main() -> Result<()> {
    let (csv_path, opts) = parse_args()?;
    println!("🎞️  Reproduciendo traza desde {csv_path:?}");
    println!(
        "⚙️  delay={}s  re-notify={}s\n",
        opts.delay_sec, opts.re_notify_interval
    );

    let samples = load_signal_trace(&csv_path)?;

    let tally = Arc::new(Mutex::new(Tally::default()));
    let printer = Printer(Arc::clone(&tally));

    let mut machine = DelayConfirm::new(DelayConfirmParams {
        delay_sec: opts.delay_sec,
        re_notify_interval: opts.re_notify_interval,
        ..DelayConfirmParams::default()
    });
    machine.add_fall_observer(Box::new(printer.clone()));
    machine.add_suspected_observer(Box::new(printer));

    let mut final_state = FallState::Normal;
    for sample in &samples {
        final_state = machine.update(sample.fallen, sample.timestamp);
    }

    let tally = tally.lock().unwrap();
    println!("\n📊 Resumen de {} muestras:", samples.len());
    println!("  Sospechas:        {}", tally.suspected);
    println!("  Descartadas:      {}", tally.cleared);
    println!("  Caídas (eventos): {}", tally.confirmed);
    println!("  Notificaciones:   {}", tally.notifications);
    println!("  Recuperaciones:   {}", tally.recovered);
    println!("  Estado final:     {final_state:?}");

    Ok(())
}
