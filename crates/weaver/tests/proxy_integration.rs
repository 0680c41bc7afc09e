//! Integration tests for proxy generation and dispatch
//!
//! Every test defines its classes in a fresh loader, generates proxies
//! through the public facade and calls them the way user code would.

use std::sync::{Arc, Mutex};

use weaver::{
    fixed_value, interceptor, no_op, Callback, CallbackKind, ClassDefinition, ConstructorDefinition,
    DebugSink, Enhancer, FieldDefinition, InvokeError, MethodDefinition, MethodProxy, Proxy,
    RouteByName, Signature, TypeLoader, Value, WeaverConfig, WeaverError,
};

fn service_loader() -> TypeLoader {
    let loader = TypeLoader::new();
    loader
        .define(
            ClassDefinition::new("demo.Service")
                .add_method(MethodDefinition::new("String greet()", |_| Ok(Value::string("hello"))))
                .add_method(MethodDefinition::new("int add(int, int)", |ctx| {
                    Ok(Value::int(ctx.int_arg(0)? + ctx.int_arg(1)?))
                }))
                .add_method(MethodDefinition::new("void log(String)", |_| Ok(Value::Void)))
                .add_method(MethodDefinition::new("String hello(String)", |ctx| {
                    let name = ctx.arg(0)?.clone();
                    ctx.invoke_self("String greet()", &[])?;
                    Ok(name)
                }))
                .add_method(MethodDefinition::new("int version()", |_| Ok(Value::int(1))).as_final())
                .add_method(MethodDefinition::new("void reset()", |_| Ok(Value::Void)).as_private())
                .add_method(MethodDefinition::new("int create()", |_| Ok(Value::int(0))).as_static()),
        )
        .unwrap();
    loader
}

fn sig(declaration: &str) -> Signature {
    Signature::parse(declaration).unwrap()
}

#[test]
fn test_greet_and_add_scenario() {
    let loader = service_loader();
    let service = Enhancer::new(&loader)
        .set_superclass("demo.Service")
        .set_callback(interceptor(|_, _, method, args, _| match method.name() {
            "greet" => Ok(Value::string("hi")),
            "add" => {
                let a = args[0].as_int().unwrap_or(0);
                let b = args[1].as_int().unwrap_or(0);
                Ok(Value::int(a + b + 1))
            }
            _ => Ok(Value::Null),
        }))
        .create()
        .unwrap();

    assert_eq!(service.call("String greet()", &[]).unwrap(), Value::string("hi"));
    assert_eq!(
        service.call("int add(int, int)", &[Value::int(2), Value::int(3)]).unwrap(),
        Value::int(6)
    );
}

#[test]
fn test_override_completeness() {
    let loader = service_loader();
    let generated = Enhancer::new(&loader)
        .set_superclass("demo.Service")
        .set_callback(no_op())
        .create_class()
        .unwrap();

    let mut overridden: Vec<String> = generated
        .methods()
        .iter()
        .map(|m| m.record.signature.declaration())
        .collect();
    overridden.sort();
    assert_eq!(
        overridden,
        vec![
            "int add(int, int)",
            "java.lang.String greet()",
            "java.lang.String hello(java.lang.String)",
            "void log(java.lang.String)",
        ]
    );
    for method in generated.methods() {
        let own = generated.class().declared_method(&method.record.signature).unwrap();
        assert!(own.access.is_final());
        assert!(generated.class().declared_method(&method.access_method).is_some());
    }
    assert!(generated.intercepted(&sig("int version()")).is_none());
}

#[test]
fn test_arguments_are_boxed_for_interceptors() {
    let loader = service_loader();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let service = Enhancer::new(&loader)
        .set_superclass("demo.Service")
        .set_callback(interceptor(move |_, proxy, _, args, method| {
            log.lock().unwrap().extend(args.iter().cloned());
            method.invoke_super(proxy, args)
        }))
        .create()
        .unwrap();

    let result = service.call("int add(int, int)", &[Value::int(4), Value::int(5)]).unwrap();
    assert_eq!(result, Value::int(9));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Value::int(4).boxed(), Value::int(5).boxed()]
    );
}

#[test]
fn test_null_callback_falls_back_to_original() {
    let loader = service_loader();
    let plain = loader.new_instance("demo.Service", "", &[]).unwrap();
    let proxy = Proxy::from_object(
        Enhancer::new(&loader)
            .set_superclass("demo.Service")
            .set_callback(fixed_value(0))
            .set_callback_type(CallbackKind::FixedValue)
            .create()
            .unwrap(),
    )
    .unwrap();
    proxy.clear_callback(0).unwrap();

    for (a, b) in [(0, 0), (2, 3), (-7, 7), (i32::MAX, 0)] {
        let args = [Value::int(a), Value::int(b)];
        assert_eq!(
            proxy.call("int add(int, int)", &args).unwrap(),
            plain.call("int add(int, int)", &args).unwrap()
        );
    }
    assert_eq!(proxy.call("String greet()", &[]).unwrap(), Value::string("hello"));
}

#[test]
fn test_return_coercion() {
    let loader = service_loader();
    let service = Enhancer::new(&loader)
        .set_superclass("demo.Service")
        .set_callback(interceptor(|_, _, method, _, _| match method.name() {
            "add" => Ok(Value::int(41).boxed()),
            "log" => Ok(Value::string("ignored")),
            _ => Ok(Value::Null),
        }))
        .create()
        .unwrap();

    assert_eq!(
        service.call("int add(int, int)", &[Value::int(1), Value::int(1)]).unwrap(),
        Value::int(41)
    );
    assert_eq!(service.call("void log(String)", &[Value::string("x")]).unwrap(), Value::Void);
    assert_eq!(service.call("String greet()", &[]).unwrap(), Value::Null);
}

#[test]
fn test_null_result_for_primitive_becomes_zero() {
    let loader = service_loader();
    let service = Enhancer::create_proxy(
        &loader,
        "demo.Service",
        interceptor(|_, _, _, _, _| Ok(Value::Null)),
    )
    .unwrap();
    assert_eq!(
        service.call("int add(int, int)", &[Value::int(1), Value::int(2)]).unwrap(),
        Value::int(0)
    );
}

#[test]
fn test_wrong_result_type_is_a_cast_failure() {
    let loader = service_loader();
    let service = Enhancer::create_proxy(
        &loader,
        "demo.Service",
        interceptor(|_, _, _, _, _| Ok(Value::string("nope"))),
    )
    .unwrap();
    let err = service
        .call("int add(int, int)", &[Value::int(1), Value::int(2)])
        .unwrap_err();
    assert!(matches!(err, InvokeError::ClassCast { .. }));
}

#[test]
fn test_thrown_failure_propagates_unchanged() {
    let loader = service_loader();
    let service = Enhancer::create_proxy(
        &loader,
        "demo.Service",
        interceptor(|_, _, _, _, _| Err(InvokeError::thrown("demo.Boom", "bad input"))),
    )
    .unwrap();

    match service.call("String greet()", &[]).unwrap_err() {
        InvokeError::Thrown(thrown) => {
            assert_eq!(thrown.class_name, "demo.Boom");
            assert_eq!(thrown.message, "bad input");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_final_method_is_not_intercepted() {
    let loader = service_loader();
    let service = Enhancer::new(&loader)
        .set_superclass("demo.Service")
        .set_callback(fixed_value(99))
        .create()
        .unwrap();
    assert_eq!(service.call("int version()", &[]).unwrap(), Value::int(1));
}

#[test]
fn test_caller_is_reported() {
    let loader = service_loader();
    let callers = Arc::new(Mutex::new(Vec::new()));
    let seen = callers.clone();
    let service = Enhancer::new(&loader)
        .set_superclass("demo.Service")
        .set_callbacks(vec![
            no_op(),
            interceptor(move |caller, proxy, _, args, method| {
                seen.lock().unwrap().push(caller.map(str::to_string));
                method.invoke_super(proxy, args)
            }),
        ])
        .set_callback_filter(Arc::new(RouteByName::new(0).route("greet", 1)))
        .create()
        .unwrap();

    service.call("String greet()", &[]).unwrap();
    let name = service.call("String hello(String)", &[Value::string("ann")]).unwrap();
    assert_eq!(name, Value::string("ann"));
    assert_eq!(
        *callers.lock().unwrap(),
        vec![None, Some("demo.Service".to_string())]
    );
}

#[test]
fn test_method_proxy_outlives_the_call() {
    let loader = service_loader();
    let kept: Arc<Mutex<Option<MethodProxy>>> = Arc::new(Mutex::new(None));
    let slot = kept.clone();
    let service = Enhancer::new(&loader)
        .set_superclass("demo.Service")
        .set_callback(interceptor(move |_, _, _, _, method| {
            *slot.lock().unwrap() = Some(method.clone());
            Ok(Value::int(0))
        }))
        .create()
        .unwrap();

    service.call("int add(int, int)", &[Value::int(1), Value::int(2)]).unwrap();
    let method = kept.lock().unwrap().clone().unwrap();
    assert_eq!(method.signature(), &sig("int add(int, int)"));
    let original = method
        .invoke_super(&service, &[Value::int(20).boxed(), Value::int(22).boxed()])
        .unwrap();
    assert_eq!(original, Value::int(42).boxed());
}

#[test]
fn test_find_method_proxy() {
    let loader = service_loader();
    let generated = Enhancer::new(&loader)
        .set_superclass("demo.Service")
        .set_callback(no_op())
        .create_class()
        .unwrap();
    let handle = generated.find_method_proxy("add(II)I").unwrap();
    assert_eq!(handle.class_name(), generated.name());
    assert!(handle.super_name().starts_with("WEAVER$add$"));
    assert!(generated.find_method_proxy("add(JJ)J").is_none());
}

// ===== Caching and naming =====

#[test]
fn test_cache_returns_same_type() {
    let loader = service_loader();
    let enhancer = Enhancer::new(&loader).set_superclass("demo.Service").set_callback(no_op());
    let first = enhancer.create_class().unwrap();
    let second = enhancer.create_class().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let stats = loader.cache().stats();
    assert_eq!(stats.generations, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.entries, 1);
}

#[test]
fn test_uncached_generation_takes_next_name() {
    let loader = service_loader();
    let first = Enhancer::new(&loader)
        .set_superclass("demo.Service")
        .set_callback(no_op())
        .create_class()
        .unwrap();
    let second = Enhancer::new(&loader)
        .set_superclass("demo.Service")
        .set_callback(no_op())
        .set_use_cache(false)
        .create_class()
        .unwrap();

    assert!(first.name().starts_with("demo.Service$$EnhancerByWeaver$$"));
    assert_eq!(second.name(), format!("{}_2", first.name()));
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn test_dropped_proxies_reuse_the_cached_type() {
    let loader = service_loader();
    let classes_before = loader.class_count();

    let mut names = Vec::new();
    for _ in 0..20 {
        let proxy = Enhancer::create_proxy(&loader, "demo.Service", no_op()).unwrap();
        names.push(proxy.generated_type().unwrap().name().to_string());
    }
    names.dedup();
    assert_eq!(names.len(), 1);
    assert!(!names[0].ends_with("_2"));

    assert_eq!(loader.class_count(), classes_before + 1);
    assert_eq!(loader.generated_count(), 1);
    let stats = loader.cache().stats();
    assert_eq!(stats.generations, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 19);

    assert_eq!(loader.cache().purge(), 0);
    let generated = loader.generated_type(&names[0]).unwrap();
    assert!(Enhancer::is_enhanced_class(generated.class()));
    assert!(!Enhancer::is_enhanced_class(&loader.load("demo.Service").unwrap()));
}

#[test]
fn test_failed_generation_is_not_cached() {
    let loader = service_loader();
    let enhancer = Enhancer::new(&loader)
        .set_superclass("demo.Service")
        .set_callbacks(vec![no_op(), no_op()])
        .set_callback_filter(Arc::new(RouteByName::new(0).route("add", 5)));

    for _ in 0..2 {
        let err = enhancer.create_class().unwrap_err();
        assert!(matches!(
            err,
            WeaverError::FilterIndexOutOfRange { index: 5, slots: 2, .. }
        ));
    }
    assert!(loader.cache().is_empty());
    assert_eq!(loader.cache().stats().misses, 2);
    assert_eq!(loader.cache().stats().generations, 0);
}

// ===== Hierarchies =====

#[test]
fn test_covariant_bridge_calls_target_virtually() {
    let loader = TypeLoader::new();
    loader
        .define(
            ClassDefinition::new("demo.Box")
                .add_method(MethodDefinition::new("Object get()", |_| Ok(Value::Null))),
        )
        .unwrap();
    loader
        .define(
            ClassDefinition::new("demo.StringBox")
                .extends("demo.Box")
                .add_method(MethodDefinition::new("String get()", |_| Ok(Value::string("boxed"))))
                .add_method(MethodDefinition::bridge("Object get()", "String get()")),
        )
        .unwrap();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = calls.clone();
    let boxed = Enhancer::new(&loader)
        .set_superclass("demo.StringBox")
        .set_callback(interceptor(move |_, proxy, method, args, handle| {
            log.lock().unwrap().push(method.signature.return_type().class_name());
            handle.invoke_super(proxy, args)
        }))
        .create()
        .unwrap();

    assert_eq!(boxed.call("Object get()", &[]).unwrap(), Value::string("boxed"));
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["java.lang.Object".to_string(), "java.lang.String".to_string()]
    );
}

#[test]
fn test_visibility_bridge_does_not_recurse() {
    let loader = TypeLoader::new();
    loader
        .define(
            ClassDefinition::new("demo.Hidden").add_method(
                MethodDefinition::new("String id()", |_| Ok(Value::string("hidden-id"))).as_package_private(),
            ),
        )
        .unwrap();
    loader
        .define(
            ClassDefinition::new("demo.Exposed")
                .extends("demo.Hidden")
                .add_method(MethodDefinition::super_bridge("String id()")),
        )
        .unwrap();

    let exposed = Enhancer::create_proxy(&loader, "demo.Exposed", no_op()).unwrap();
    assert_eq!(exposed.call("String id()", &[]).unwrap(), Value::string("hidden-id"));
}

#[test]
fn test_abstract_method_invoked() {
    let loader = TypeLoader::new();
    loader
        .define(
            ClassDefinition::new("demo.Shape")
                .as_abstract()
                .add_method(MethodDefinition::abstract_method("double area()"))
                .add_method(MethodDefinition::new("String kind()", |_| Ok(Value::string("shape")))),
        )
        .unwrap();

    let shape = Enhancer::create_proxy(&loader, "demo.Shape", no_op()).unwrap();
    assert_eq!(shape.call("String kind()", &[]).unwrap(), Value::string("shape"));
    match shape.call("double area()", &[]).unwrap_err() {
        InvokeError::AbstractMethod { owner, signature } => {
            assert_eq!(owner, "demo.Shape");
            assert_eq!(signature, "area()D");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_interface_proxy() {
    let loader = TypeLoader::new();
    loader
        .define(
            ClassDefinition::interface("demo.Runner")
                .add_method(MethodDefinition::abstract_method("String name()"))
                .add_method(MethodDefinition::abstract_method("void run()")),
        )
        .unwrap();

    let runner = Enhancer::new(&loader)
        .set_superclass("demo.Runner")
        .set_callback(fixed_value("runner"))
        .create()
        .unwrap();

    assert!(runner.class_name().starts_with("demo.Runner$$EnhancerByWeaver$$"));
    assert!(runner.class().is_subtype_of("demo.Runner"));
    assert_eq!(runner.call("String name()", &[]).unwrap(), Value::string("runner"));
    assert_eq!(runner.call("void run()", &[]).unwrap(), Value::Void);
}

#[test]
fn test_extra_interfaces() {
    let loader = service_loader();
    loader
        .define(
            ClassDefinition::interface("demo.Named")
                .add_method(MethodDefinition::abstract_method("String label()")),
        )
        .unwrap();

    let service = Enhancer::new(&loader)
        .set_superclass("demo.Service")
        .set_interfaces(&["demo.Named"])
        .set_callback(interceptor(|_, proxy, method, args, handle| {
            if method.name() == "label" {
                Ok(Value::string("named"))
            } else {
                handle.invoke_super(proxy, args)
            }
        }))
        .create()
        .unwrap();

    assert!(service.class().is_subtype_of("demo.Named"));
    assert!(service.class().is_subtype_of("demo.Service"));
    assert_eq!(service.call("String label()", &[]).unwrap(), Value::string("named"));
    assert_eq!(service.call("String greet()", &[]).unwrap(), Value::string("hello"));
}

// ===== Construction =====

fn account_loader() -> TypeLoader {
    let loader = TypeLoader::new();
    loader
        .define(
            ClassDefinition::new("demo.Account")
                .add_field(FieldDefinition::new("balance", "int"))
                .add_field(FieldDefinition::new("label", "String"))
                .add_constructor(ConstructorDefinition::new("", |ctx| {
                    let label = ctx.invoke_self("String describe()", &[])?;
                    ctx.this.set_field("label", label);
                    Ok(Value::Void)
                }))
                .add_constructor(ConstructorDefinition::new("int", |ctx| {
                    ctx.this.set_field("balance", Value::int(ctx.int_arg(0)?));
                    Ok(Value::Void)
                }))
                .add_constructor(ConstructorDefinition::new("String", |_| Ok(Value::Void)).as_private())
                .add_method(MethodDefinition::new("int balance()", |ctx| {
                    Ok(ctx.this.get_field("balance").unwrap_or(Value::int(0)))
                }))
                .add_method(MethodDefinition::new("String describe()", |_| Ok(Value::string("account")))),
        )
        .unwrap();
    loader
}

fn describe_interceptor() -> Arc<dyn Callback> {
    interceptor(|_, proxy, method, args, handle| {
        if method.name() == "describe" {
            Ok(Value::string("intercepted"))
        } else {
            handle.invoke_super(proxy, args)
        }
    })
}

#[test]
fn test_constructor_arguments_are_forwarded() {
    let loader = account_loader();
    let enhancer = Enhancer::new(&loader)
        .set_superclass("demo.Account")
        .set_callback(describe_interceptor());

    let account = enhancer.create_with("int", &[Value::int(250)]).unwrap();
    assert_eq!(account.call("int balance()", &[]).unwrap(), Value::int(250));

    let generated = enhancer.create_class().unwrap();
    assert_eq!(generated.constructors().len(), 2);

    let err = enhancer.create_with("String", &[Value::string("x")]).unwrap_err();
    assert!(matches!(err, WeaverError::NoMatchingConstructor { .. }));
}

#[test]
fn test_intercept_during_construction() {
    let loader = account_loader();

    let early = Enhancer::new(&loader)
        .set_superclass("demo.Account")
        .set_callback(describe_interceptor())
        .create()
        .unwrap();
    assert_eq!(early.get_field("label"), Some(Value::string("intercepted")));

    let late = Enhancer::new(&loader)
        .set_superclass("demo.Account")
        .set_callback(describe_interceptor())
        .set_intercept_during_construction(false)
        .create()
        .unwrap();
    assert_eq!(late.get_field("label"), Some(Value::string("account")));
    assert_eq!(late.call("String describe()", &[]).unwrap(), Value::string("intercepted"));
}

// ===== Configuration errors =====

struct Inert;

impl Callback for Inert {}

#[test]
fn test_unknown_callback_kind() {
    let loader = service_loader();
    let err = Enhancer::new(&loader)
        .set_superclass("demo.Service")
        .set_callback(Arc::new(Inert))
        .create()
        .unwrap_err();
    assert!(matches!(err, WeaverError::UnknownCallbackKind(_)));
}

#[test]
fn test_final_superclass_is_rejected() {
    let loader = TypeLoader::new();
    loader.define(ClassDefinition::new("demo.Sealed").as_final()).unwrap();
    let err = Enhancer::create_proxy(&loader, "demo.Sealed", no_op()).unwrap_err();
    assert!(matches!(err, WeaverError::CannotSubclassFinal(name) if name == "demo.Sealed"));
}

#[test]
fn test_non_interface_in_interface_list() {
    let loader = service_loader();
    loader.define(ClassDefinition::new("demo.Plain")).unwrap();
    let err = Enhancer::new(&loader)
        .set_superclass("demo.Service")
        .set_interfaces(&["demo.Plain"])
        .set_callback(no_op())
        .create()
        .unwrap_err();
    assert!(matches!(err, WeaverError::NotAnInterface(name) if name == "demo.Plain"));
}

#[test]
fn test_no_visible_constructors() {
    let loader = TypeLoader::new();
    loader
        .define(
            ClassDefinition::new("demo.Singleton")
                .add_constructor(ConstructorDefinition::new("", |_| Ok(Value::Void)).as_private()),
        )
        .unwrap();
    let err = Enhancer::create_proxy(&loader, "demo.Singleton", no_op()).unwrap_err();
    assert!(matches!(err, WeaverError::NoVisibleConstructors(_)));
}

// ===== Factory =====

#[test]
fn test_factory_operations() {
    let loader = service_loader();
    let proxy = Proxy::from_object(
        Enhancer::new(&loader)
            .set_superclass("demo.Service")
            .set_callback(fixed_value("first"))
            .create()
            .unwrap(),
    )
    .unwrap();

    let sibling = proxy.new_instance_single(fixed_value("second")).unwrap();
    assert!(Arc::ptr_eq(proxy.generated_type(), sibling.generated_type()));
    assert_eq!(sibling.call("String greet()", &[]).unwrap(), Value::string("second"));
    assert_eq!(proxy.call("String greet()", &[]).unwrap(), Value::string("first"));

    proxy.set_callbacks(&[fixed_value("third")]).unwrap();
    assert_eq!(proxy.call("String greet()", &[]).unwrap(), Value::string("third"));
    assert_eq!(proxy.callbacks().len(), 1);

    let err = proxy.new_instance(&[fixed_value("a"), fixed_value("b")]).unwrap_err();
    assert!(matches!(
        err,
        WeaverError::CallbackCountMismatch { expected: 1, actual: 2 }
    ));
    let err = proxy.new_instance(&[no_op()]).unwrap_err();
    assert!(matches!(err, WeaverError::CallbackTypeMismatch { .. }));
}

// ===== Debug sink =====

#[test]
fn test_debug_location_receives_generated_images() {
    let dir = tempfile::tempdir().unwrap();
    let loader = service_loader();
    let generated = Enhancer::new(&loader)
        .set_superclass("demo.Service")
        .set_callback(no_op())
        .with_config(WeaverConfig::new().with_debug_location(dir.path()))
        .create_class()
        .unwrap();

    let sink = DebugSink::new(dir.path());
    let image = std::fs::read(sink.path_for(generated.name(), "wci")).unwrap();
    assert_eq!(&image[..], &generated.artifact()[..]);
    let listing = std::fs::read_to_string(sink.path_for(generated.name(), "asm")).unwrap();
    assert!(listing.contains("WEAVER$CALLBACK_0"));
    assert!(listing.contains("WEAVER$add$"));
}
