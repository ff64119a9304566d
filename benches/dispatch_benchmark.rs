use std::hint::black_box;
use std::io;
use std::ptr::NonNull;

use criterion::{criterion_group, criterion_main, Criterion};
use voxel_script::bindings::dispatch::{read_buffer, write_buffer};
use voxel_script::host::{Goxel, Layer, CLASSES, LAYER_NAME_LEN};
use voxel_script::scripting::Console;
use voxel_script::{ScriptConfig, ScriptHost};

fn bench_string_buffers(c: &mut Criterion) {
    let mut storage = [0u8; LAYER_NAME_LEN];
    let long = "voxel-layer-".repeat(32);

    c.bench_function("write_buffer_truncating", |b| {
        b.iter(|| {
            let buffer = NonNull::from(&mut storage[..]);
            black_box(write_buffer(buffer, black_box(&long)));
        });
    });

    c.bench_function("read_buffer_full", |b| {
        b.iter(|| black_box(read_buffer(NonNull::from(&storage[..]))));
    });
}

fn bench_script_dispatch(c: &mut Criterion) {
    let mut goxel = Goxel::new();
    for i in 0..64 {
        goxel.image_mut().add_layer(Layer::with_name(&format!("layer {}", i)));
    }
    let console = Console::new(Box::new(io::sink()), Box::new(io::sink()));
    let mut host = match ScriptHost::with_console(ScriptConfig::default(), console) {
        Ok(host) => host,
        Err(e) => panic!("script host: {}", e),
    };
    if let Err(e) = host.bootstrap(&CLASSES, &mut goxel) {
        panic!("bootstrap: {}", e);
    }

    c.bench_function("property_get_1000", |b| {
        b.iter(|| {
            let outcome = host.eval(
                "bench",
                "var n = 0; for (var i = 0; i < 1000; i++) { n += goxel.image.active_layer.id; }",
            );
            black_box(outcome.ok());
        });
    });

    c.bench_function("collection_walk_64", |b| {
        b.iter(|| {
            let outcome = host.eval(
                "bench",
                "var names = []; var l = goxel.image.layers; \
                 for (var i = 0; i < l.length; i++) { names.push(l.at(i).name); }",
            );
            black_box(outcome.ok());
        });
    });
}

criterion_group!(benches, bench_string_buffers, bench_script_dispatch);
criterion_main!(benches);
