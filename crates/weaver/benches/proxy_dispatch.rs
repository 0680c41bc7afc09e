use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use weaver::{
    fixed_value, interceptor, no_op, ClassDefinition, Enhancer, MethodDefinition, Proxy, TypeLoader, Value,
};

fn calculator() -> TypeLoader {
    let loader = TypeLoader::new();
    loader
        .define(
            ClassDefinition::new("bench.Calculator").add_method(MethodDefinition::new(
                "int add(int, int)",
                |ctx| Ok(Value::int(ctx.int_arg(0)? + ctx.int_arg(1)?)),
            )),
        )
        .unwrap();
    loader
}

fn bench_dispatch(c: &mut Criterion) {
    let loader = calculator();
    let plain = loader.new_instance("bench.Calculator", "", &[]).unwrap();
    let intercepted = Enhancer::new(&loader)
        .set_superclass("bench.Calculator")
        .set_callback(interceptor(|_, proxy, _, args, method| method.invoke_super(proxy, args)))
        .create()
        .unwrap();
    let forwarded = Enhancer::create_proxy(&loader, "bench.Calculator", no_op()).unwrap();
    let fixed = Enhancer::new(&loader)
        .set_superclass("bench.Calculator")
        .set_callback(fixed_value(3))
        .create()
        .unwrap();
    let empty = Proxy::from_object(Enhancer::create_proxy(&loader, "bench.Calculator", no_op()).unwrap())
        .unwrap()
        .new_instance(&[no_op()])
        .unwrap();
    empty.clear_callback(0).unwrap();

    let args = [Value::int(2), Value::int(3)];
    let mut group = c.benchmark_group("dispatch");
    for (name, object) in [
        ("plain", &plain),
        ("interceptor", &intercepted),
        ("no_op", &forwarded),
        ("fixed_value", &fixed),
        ("empty_slot", empty.object()),
    ] {
        group.bench_with_input(BenchmarkId::new("add", name), object, |b, object| {
            b.iter(|| object.call("int add(int, int)", black_box(&args)).unwrap());
        });
    }
    group.finish();
}

fn bench_cache(c: &mut Criterion) {
    let loader = calculator();
    let enhancer = Enhancer::new(&loader)
        .set_superclass("bench.Calculator")
        .set_callback(no_op());
    let _warm = enhancer.create_class().unwrap();

    c.bench_function("cache_hit", |b| {
        b.iter(|| enhancer.create_class().unwrap());
    });

    c.bench_function("generate_uncached", |b| {
        let uncached = Enhancer::new(&loader)
            .set_superclass("bench.Calculator")
            .set_callback(no_op())
            .set_use_cache(false);
        b.iter(|| uncached.create_class().unwrap());
    });
}

criterion_group!(benches, bench_dispatch, bench_cache);
criterion_main!(benches);
