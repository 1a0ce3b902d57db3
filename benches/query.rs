use criterion::*;
use phalanx::{ComponentId, Value, World};

const POSITION: ComponentId = ComponentId::new(1);
const VELOCITY: ComponentId = ComponentId::new(2);
const FROZEN: ComponentId = ComponentId::new(3);

fn populated_world() -> World {
    let mut world = World::new();
    for i in 0..10_000i64 {
        let entity = world.entity().unwrap();
        world.set(entity, POSITION, i).unwrap();
        if i % 2 == 0 {
            world.set(entity, VELOCITY, i).unwrap();
        }
        if i % 5 == 0 {
            world.set(entity, FROZEN, true).unwrap();
        }
    }
    world
}

fn bench_single_component_scan(c: &mut Criterion) {
    let world = populated_world();
    c.bench_function("query_single_component", |b| {
        b.iter(|| {
            let mut total = 0i64;
            for row in world.query(&[POSITION]).unwrap().view() {
                if let Some(Value::Int(value)) = row.get(0) {
                    total += value;
                }
            }
            criterion::black_box(total);
        });
    });
}

fn bench_filtered_scan(c: &mut Criterion) {
    let world = populated_world();
    c.bench_function("query_two_components_excluding_one", |b| {
        b.iter(|| {
            let view = world
                .query(&[POSITION, VELOCITY])
                .unwrap()
                .without(&[FROZEN])
                .unwrap();
            criterion::black_box(view.view().count());
        });
    });
}

criterion_group!(basic, bench_single_component_scan, bench_filtered_scan);
criterion_main!(basic);
