//! End-to-end build simulation against the resolver
//!
//! Drives the resolver the way a build executor would: one query per
//! instruction, feeding each answer back into the next query's state.

use chrono::{Duration, TimeZone, Utc};
use layercache::config::{BuildConfig, StrictComparator};
use layercache::image::{DiffId, HistoryEntry, Image, ImageId};
use layercache::store::MemoryStore;
use layercache::{CacheAnswer, CacheQuery, CacheResolver, ResolverSettings};
use std::sync::Arc;

/// One instruction of the simulated Dockerfile
struct Instruction {
    command: &'static str,
    produces_layer: bool,
}

const DOCKERFILE: &[Instruction] = &[
    Instruction {
        command: "ENV PORT=8080",
        produces_layer: false,
    },
    Instruction {
        command: "COPY src /src",
        produces_layer: true,
    },
    Instruction {
        command: "RUN make install",
        produces_layer: true,
    },
];

fn published_image(id: &str, layers: &[&str]) -> Image {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    Image {
        id: ImageId::new(id),
        parent: None,
        config: BuildConfig {
            cmd: vec!["/src/serve".to_string()],
            entrypoint: vec!["/bin/app".to_string()],
            ..BuildConfig::default()
        },
        created_at: base + Duration::minutes(10),
        history: DOCKERFILE
            .iter()
            .enumerate()
            .map(|(i, instruction)| HistoryEntry {
                command: instruction.command.to_string(),
                created_at: base + Duration::minutes(i as i64),
                produces_layer: instruction.produces_layer,
            })
            .collect(),
        layer_diff_ids: layers.iter().map(|l| DiffId::new(*l)).collect(),
    }
}

async fn resolver_for(
    store: &Arc<MemoryStore>,
    cache_from: &[&str],
) -> CacheResolver {
    let cache_from: Vec<String> = cache_from.iter().map(|s| s.to_string()).collect();
    CacheResolver::new(
        Arc::clone(store) as Arc<dyn layercache::store::ImageStore>,
        Arc::clone(store) as Arc<dyn layercache::store::ReferenceStore>,
        Arc::new(StrictComparator),
        &cache_from,
        None,
        ResolverSettings::default(),
    )
    .await
    .expect("resolver construction")
}

fn probe(command: &str, chain: &[DiffId]) -> CacheQuery {
    CacheQuery {
        parent: None,
        config: BuildConfig::for_command(command.split_whitespace()),
        preceding_layers: chain.to_vec(),
    }
}

#[tokio::test]
async fn cold_build_misses_every_step() {
    let store = Arc::new(MemoryStore::new());
    let mut resolver = resolver_for(&store, &[]).await;

    let mut chain: Vec<DiffId> = Vec::new();
    for instruction in DOCKERFILE {
        let answer = resolver
            .get_cached_image_on_build(&probe(instruction.command, &chain))
            .await
            .unwrap();
        assert_eq!(answer, CacheAnswer::Miss);

        // the executor runs the instruction and commits a layer itself
        if instruction.produces_layer {
            chain.push(DiffId::digest(instruction.command.as_bytes()));
        }
    }
}

#[tokio::test]
async fn pulled_image_replays_from_its_history() {
    let store = Arc::new(MemoryStore::new());
    store.insert(published_image(
        "sha256:published",
        &["sha256:layer-src", "sha256:layer-make"],
    ));
    store.tag("registry.example.com/app:v1", ImageId::new("sha256:published"));

    let mut resolver = resolver_for(&store, &["registry.example.com/app:v1"]).await;

    let mut chain: Vec<DiffId> = Vec::new();
    let mut hits = 0;
    for instruction in DOCKERFILE {
        let answer = resolver
            .get_cached_image_on_build(&probe(instruction.command, &chain))
            .await
            .unwrap();

        match answer {
            CacheAnswer::Layer(layer) => {
                hits += 1;
                assert_eq!(layer.source, "registry.example.com/app:v1");
                if chain.last() != Some(&layer.diff_id) && layer.diff_id != *DiffId::empty_layer()
                {
                    chain.push(layer.diff_id);
                }
            }
            other => panic!("expected layer reuse for {}, got {other:?}", instruction.command),
        }
    }

    assert_eq!(hits, DOCKERFILE.len());
    assert_eq!(
        chain,
        vec![DiffId::new("sha256:layer-src"), DiffId::new("sha256:layer-make")]
    );
}

#[tokio::test]
async fn edited_instruction_stops_reuse_at_the_divergence_point() {
    let store = Arc::new(MemoryStore::new());
    store.insert(published_image(
        "sha256:published",
        &["sha256:layer-src", "sha256:layer-make"],
    ));
    store.tag("app:v1", ImageId::new("sha256:published"));

    let mut resolver = resolver_for(&store, &["app:v1"]).await;
    let mut chain: Vec<DiffId> = Vec::new();

    // first two instructions unchanged: reuse
    for instruction in &DOCKERFILE[..2] {
        let answer = resolver
            .get_cached_image_on_build(&probe(instruction.command, &chain))
            .await
            .unwrap();
        let CacheAnswer::Layer(layer) = answer else {
            panic!("expected reuse for {}", instruction.command);
        };
        if layer.diff_id != *DiffId::empty_layer() {
            chain.push(layer.diff_id);
        }
    }

    // the third instruction was edited: miss, and the executor runs it
    let answer = resolver
        .get_cached_image_on_build(&probe("RUN make install DESTDIR=/opt", &chain))
        .await
        .unwrap();
    assert_eq!(answer, CacheAnswer::Miss);
    chain.push(DiffId::new("sha256:layer-local-make"));

    // a later identical instruction can never re-converge
    let answer = resolver
        .get_cached_image_on_build(&probe("RUN make install", &chain))
        .await
        .unwrap();
    assert_eq!(answer, CacheAnswer::Miss);
}

#[tokio::test]
async fn committed_children_short_circuit_rebuilds() {
    let store = Arc::new(MemoryStore::new());
    let base_time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

    // a previous build committed real images for the first two steps
    let env_config = BuildConfig::for_command("ENV PORT=8080".split_whitespace());
    let copy_config = BuildConfig::for_command("COPY src /src".split_whitespace());
    store.insert(Image {
        id: ImageId::new("sha256:step-env"),
        parent: None,
        config: env_config.clone(),
        created_at: base_time,
        history: vec![],
        layer_diff_ids: vec![],
    });
    store.insert(Image {
        id: ImageId::new("sha256:step-copy"),
        parent: Some(ImageId::new("sha256:step-env")),
        config: copy_config.clone(),
        created_at: base_time + Duration::minutes(1),
        history: vec![],
        layer_diff_ids: vec![],
    });

    let mut resolver = resolver_for(&store, &[]).await;

    let answer = resolver
        .get_cached_image_on_build(&CacheQuery {
            parent: None,
            config: env_config,
            preceding_layers: vec![],
        })
        .await
        .unwrap();
    assert_eq!(answer, CacheAnswer::Image(ImageId::new("sha256:step-env")));

    let answer = resolver
        .get_cached_image_on_build(&CacheQuery {
            parent: Some(ImageId::new("sha256:step-env")),
            config: copy_config,
            preceding_layers: vec![],
        })
        .await
        .unwrap();
    assert_eq!(answer, CacheAnswer::Image(ImageId::new("sha256:step-copy")));
}
