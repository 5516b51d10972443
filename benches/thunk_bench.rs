//! Benchmarks for proxy construction and native calls

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use native_proxy::{
    native_interface, Argument, InterfaceDescriptor, MethodDescriptor, NativeType, ProxyFactory,
};

native_interface! {
    pub trait Library {
        #[symbol = "add"]
        fn add(&self, a: i32, b: i32) -> i32;
        #[symbol = "add_one"]
        fn add_one(&self, a: &mut i32);
    }
}

fn dynamic_descriptor() -> InterfaceDescriptor {
    InterfaceDescriptor::new("Library")
        .method(
            MethodDescriptor::new("add")
                .bind("add")
                .param("a", NativeType::I32)
                .param("b", NativeType::I32)
                .returns(NativeType::I32),
        )
        .method(
            MethodDescriptor::new("add_one")
                .bind("add_one")
                .by_ref("a", NativeType::I32),
        )
}

/// Typed calls through the generated trait impl
fn bench_typed_calls(c: &mut Criterion, path: &str) {
    let lib = unsafe { native_proxy::build::<dyn Library>(path) }.unwrap();
    let mut group = c.benchmark_group("typed");

    group.bench_function("add", |b| {
        b.iter(|| black_box(lib.add(black_box(2), black_box(3))))
    });

    group.bench_function("add_one", |b| {
        let mut a = 0;
        b.iter(|| {
            lib.add_one(&mut a);
            black_box(a)
        })
    });

    group.finish();
}

/// Checked calls through the dynamic path
fn bench_dynamic_calls(c: &mut Criterion, path: &str) {
    let proxy = unsafe { native_proxy::build_dynamic(&dynamic_descriptor(), path) }.unwrap();
    let mut group = c.benchmark_group("dynamic");

    group.bench_function("add", |b| {
        b.iter(|| {
            let result = proxy.invoke(
                "add",
                &mut [Argument::value(black_box(2i32)), Argument::value(3i32)],
            );
            black_box(result)
        })
    });

    group.bench_function("add_one", |b| {
        let mut a = 0i32;
        b.iter(|| {
            let result = proxy.invoke("add_one", &mut [Argument::by_ref(&mut a)]);
            black_box(result)
        })
    });

    group.finish();
}

/// Full build: descriptor, cached library, symbol lookup and CIF preparation
fn bench_build(c: &mut Criterion, path: &str) {
    let factory = ProxyFactory::new();
    // Keep one proxy alive so the library stays loaded between iterations
    let _keep = unsafe { factory.build::<dyn Library>(path) }.unwrap();

    c.bench_function("build_proxy", |b| {
        b.iter(|| black_box(unsafe { factory.build::<dyn Library>(path) }.unwrap()))
    });
}

fn bench_all(c: &mut Criterion) {
    let path = match option_env!("NATIVE_PROXY_FIXTURE") {
        Some(path) => path,
        None => {
            eprintln!("native fixture library was not built; skipping benchmarks");
            return;
        }
    };
    bench_typed_calls(c, path);
    bench_dynamic_calls(c, path);
    bench_build(c, path);
}

criterion_group!(benches, bench_all);
criterion_main!(benches);
