use heaptrace::{TableKind, TRACKER, TracingAllocator};

#[global_allocator]
static GLOBAL: TracingAllocator = TracingAllocator::system();

#[heaptrace::track]
fn load_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("name-{i}")).collect()
}

#[heaptrace::track]
fn leak_buffer(size: usize) -> &'static mut [u8] {
    Box::leak(vec![0u8; size].into_boxed_slice())
}

#[heaptrace::main]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let names = load_names(3);
    let leaked = leak_buffer(1200);

    for _ in 0..5 {
        TRACKER.tick();
    }
    let scratch = vec![7u8; 64];

    println!("names: {}, leaked: {} bytes", names.len(), leaked.len());
    TRACKER.dump(TableKind::Live);

    drop(scratch);
    drop(names);
    Ok(())
}
