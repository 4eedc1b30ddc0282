use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use async_trait::async_trait;
use quire_commands::{Command, CommandHeader, CommandService, Outcome};

struct Nop {
    header: CommandHeader,
}

impl Nop {
    fn new() -> Self {
        Self {
            header: CommandHeader::undoable(),
        }
    }
}

#[async_trait]
impl Command for Nop {
    fn header(&self) -> &CommandHeader {
        &self.header
    }

    async fn execute(&mut self) -> Outcome {
        Ok(())
    }

    async fn undo(&mut self) -> Outcome {
        Ok(())
    }
}

fn bench_execute(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("command_queue");
    for n in [10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("enqueue_and_drain", n), &n, |b, &n| {
            b.iter(|| {
                runtime.block_on(async {
                    let service = CommandService::default();
                    for _ in 1..n {
                        service.enqueue(Nop::new()).unwrap();
                    }
                    service.execute_and_wait(Nop::new()).await.unwrap();
                })
            })
        });

        group.bench_with_input(BenchmarkId::new("undo_redo", n), &n, |b, &n| {
            b.iter(|| {
                runtime.block_on(async {
                    let service = CommandService::default();
                    for _ in 1..n {
                        service.enqueue(Nop::new()).unwrap();
                    }
                    service.execute_and_wait(Nop::new()).await.unwrap();
                    while service.try_undo().await.unwrap() {}
                    while service.try_redo().await.unwrap() {}
                })
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_execute);
criterion_main!(benches);
