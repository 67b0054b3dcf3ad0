// Demo target for the leakscope pipeline: leaks two buffers on purpose.
//
//   cargo run -p leakscope -- demos/leaky.rs

fn churn() {
    for i in 0..100 {
        let v = vec![i as u8; 256];
        drop(v);
    }
}

fn main() {
    churn();

    let leaked = Box::new([0u8; 8192]);
    Box::leak(leaked);

    let also_leaked = vec![1u8; 512];
    std::mem::forget(also_leaked);

    return;
}
