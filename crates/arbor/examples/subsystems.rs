//! Subsystems: declare start-order rules, run a few frames, shut down.
//!
//! `Physics` starts after `Input`, `Render` after `Physics`. Registration
//! order is deliberately scrambled; the resolved order is printed and every
//! hook logs as it runs. `Render` writes to the `LogSystem` each frame.
//!
//! Run with: `RUST_LOG=debug cargo run -p arbor --example subsystems`

use std::rc::Rc;

use arbor::prelude::*;

// ── Systems ──────────────────────────────────────────────────────────────

struct Input;

impl System for Input {
    fn initialize(&mut self, _engine: &Engine) {
        log::info!("input ready");
    }
}

struct Physics {
    elapsed: f64,
}

impl System for Physics {
    fn register(&self, order: &mut Registration<'_>) {
        order.after("Input");
    }

    fn update(&mut self, _engine: &Engine, delta: f64) {
        self.elapsed += delta;
    }

    fn shutdown(&mut self, _engine: &Engine) {
        log::info!("physics simulated {:.3}s", self.elapsed);
    }
}

struct Render {
    frames: u32,
}

impl System for Render {
    fn register(&self, order: &mut Registration<'_>) {
        order.after("Physics");
    }

    fn update(&mut self, engine: &Engine, _delta: f64) {
        self.frames += 1;
        // Looked up lazily: peers are not reachable until every
        // initialize hook has returned.
        if let Ok(log) = engine.get_system_as::<LogSystem>() {
            log.borrow_mut()
                .write(format!("rendered frame {}", self.frames), log::Level::Info);
        }
    }
}

fn main() -> Result<()> {
    init_logger();

    let mut registry = core_registry()?;
    for class in [
        ClassBuilder::new("Render")
            .base("System")
            .system_factory(|| Render { frames: 0 }),
        ClassBuilder::new("Physics")
            .base("System")
            .system_factory(|| Physics { elapsed: 0.0 }),
        ClassBuilder::new("Input").base("System").system_factory(|| Input),
    ] {
        registry.register(class.build())?;
    }

    let clock = ManualTime::new();
    let engine = Engine::with_time_provider(
        Rc::new(registry),
        EngineConfig::default().with_log_capture(false),
        clock.clone(),
    )?;
    engine.initialize()?;
    println!("start order: {}", engine.ordered_systems().join(" → "));

    let log = engine.get_system_as::<LogSystem>()?;
    log.borrow()
        .message_logged
        .connect(|m: &LogMessage| println!("[{}] {}", m.level, m.message));

    for _ in 0..3 {
        clock.advance(1.0 / 60.0);
        let delta = engine.tick();
        println!("tick {delta:.4}s");
    }

    #[cfg(feature = "diagnostics")]
    for timing in engine.system_timings() {
        println!("  {:<10} {:>8.1}µs", timing.name, timing.duration_us);
    }

    engine.shutdown()?;
    Ok(())
}
