use heaptrace::{TableKind, TRACKER, Ticker, TracingAllocator};
use std::time::Duration;

#[global_allocator]
static GLOBAL: TracingAllocator = TracingAllocator::system();

#[heaptrace::track]
fn worker(id: usize) -> Vec<Vec<u8>> {
    let mut kept = Vec::new();
    for round in 0..50 {
        let chunk = vec![id as u8; 32 + round];
        if round % 10 == 0 {
            kept.push(chunk);
        }
    }
    kept
}

#[heaptrace::main]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let ticker = Ticker::spawn(&TRACKER, Duration::from_millis(5))?;

    let handles: Vec<_> = (0..4).map(|id| std::thread::spawn(move || worker(id))).collect();
    let mut kept = Vec::new();
    for handle in handles {
        kept.extend(handle.join().map_err(|_| "worker panicked")?);
    }

    std::thread::sleep(Duration::from_millis(30));
    drop(ticker);

    println!("kept {} chunks", kept.len());
    TRACKER.dump(TableKind::Live);
    Ok(())
}
