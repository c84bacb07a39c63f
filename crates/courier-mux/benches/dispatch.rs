//! Dispatch benchmarks

use courier_core::{Context, Message};
use courier_mux::{handler_fn, middleware::recover, Mux};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn build_mux() -> Mux {
    let mut mux = Mux::new();
    mux.middleware([recover()]);
    for kind in ["created", "updated", "deleted", "shipped"] {
        mux.handler(
            &format!("order/{kind}"),
            handler_fn(|_msg, _ctx| Box::pin(async { Ok(()) })),
        );
    }
    mux.handler(
        "dev/book/{book_id}",
        handler_fn(|_msg, _ctx| Box::pin(async { Ok(()) })),
    );
    mux.handler(
        "files/*path",
        handler_fn(|_msg, _ctx| Box::pin(async { Ok(()) })),
    );
    mux
}

fn dispatch_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let mux = build_mux();
    let ctx = Context::new();

    for subject in ["order/shipped", "dev/book/1449373321", "files/a/b/c.txt"] {
        c.bench_function(&format!("dispatch {subject}"), |b| {
            b.to_async(&runtime).iter(|| async {
                let mut msg = Message::new(subject);
                black_box(mux.handle_message(&mut msg, &ctx).await).unwrap();
            })
        });
    }
}

criterion_group!(benches, dispatch_benchmark);
criterion_main!(benches);
