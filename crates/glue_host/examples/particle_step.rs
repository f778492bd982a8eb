//! Particle step driven by script logic
//!
//! **Flow:**
//! - Native side owns the simulation settings as a `NativeValue`
//! - Script allocates the particle buffer and integrates it each tick
//! - Native side reads positions back through a zero-copy `BufferView`
//!
//! Run with `cargo run -p glue_host --example particle_step`.

use glue_convert::rquickjs::{Function, Value};
use glue_convert::{NativeMap, NativeValue, ScriptError, ScriptRuntime};

const PARTICLES: i32 = 8;

fn main() -> Result<(), ScriptError> {
    tracing_subscriber::fmt::init();
    println!("=== Particle step: script logic, native readback ===\n");

    let runtime = ScriptRuntime::new()?;
    runtime.execute(
        r#"
        function spawn(count) {
            // [x0, y0, x1, y1, ...]
            const positions = new Float32Array(count * 2);
            for (let i = 0; i < count; i++) {
                positions[i * 2] = i * 10;
                positions[i * 2 + 1] = 100;
            }
            return positions;
        }

        function step(positions, config) {
            for (let i = 1; i < positions.length; i += 2) {
                positions[i] = Math.max(config.floor, positions[i] - config.gravity * config.dt);
            }
            return positions.length / 2;
        }
        "#,
    )?;

    let config: NativeMap = [
        ("gravity", NativeValue::Number(981.0)),
        ("dt", NativeValue::Number(0.016)),
        ("floor", NativeValue::Number(0.0)),
    ]
    .into_iter()
    .collect();
    let config = NativeValue::Mapping(config);

    runtime.with_bridge(|bridge| {
        let globals = bridge.ctx().globals();
        let spawn: Function = globals.get("spawn")?;
        let step: Function = globals.get("step")?;

        let positions: Value = spawn.call((PARTICLES,))?;
        let config = bridge.to_engine(&config)?;

        for tick in 0..3 {
            let moved: Value = step.call((positions.clone(), config.clone()))?;
            println!("--- Tick {} ({} particles) ---", tick, bridge.to_number_fast(&moved));

            let view = bridge.get_buffer_view(&positions)?;
            // SAFETY: the script is not running while we read.
            let bytes = unsafe { view.as_slice() };
            for (i, pair) in bytes.chunks_exact(8).take(3).enumerate() {
                let x = f32::from_ne_bytes([pair[0], pair[1], pair[2], pair[3]]);
                let y = f32::from_ne_bytes([pair[4], pair[5], pair[6], pair[7]]);
                println!("  [{}] ({:.1}, {:.2})", i, x, y);
            }
        }
        Ok(())
    })?;

    println!("\n✓ Done");
    Ok(())
}
