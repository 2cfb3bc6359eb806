use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use dejaview::codec::{RawFeature, Vector, VectorCodec};
use dejaview::error::ExtractionError;
use dejaview::segment::IndexKind;
use dejaview::shard::{ShardConfig, ShardManager};
use dejaview::signal::{SignalConfig, SignalEngine, Threshold};
use dejaview::store::ImageStore;
use rstest::*;
use tempfile::TempDir;

const KIND: IndexKind = IndexKind::Binary { bits: 64 };
const WRITERS: u64 = 4;
const PER_WRITER: u64 = 60;
const TOTAL: u64 = WRITERS * PER_WRITER;

/// 每个 id 对应一个不同的编码
fn code(id: u64) -> Vector {
    VectorCodec::new(KIND).encode_binary_bytes(&id.to_be_bytes()).unwrap()
}

fn source(id: u64) -> String {
    format!("img/{id}.png")
}

fn engine(dir: &Path, max_vectors: usize) -> (SignalEngine, SignalConfig) {
    let store = Arc::new(ImageStore::new(dir));
    fs::create_dir_all(dir.join("img")).unwrap();
    for id in 0..TOTAL {
        fs::write(dir.join(source(id)), b"x").unwrap();
    }

    let config = SignalConfig {
        name: "phash".to_string(),
        shard: ShardConfig::new(dir.join("indices"), "phash", KIND).max_vectors(max_vectors),
        threshold: Threshold::MaxDistance(0),
        augment: false,
    };
    let shard = ShardManager::create(config.shard.clone());
    let extractor = |image: &Path| -> Result<RawFeature, ExtractionError> {
        Err(ExtractionError::Unavailable(image.display().to_string()))
    };
    (SignalEngine::new(config.clone(), shard, Box::new(extractor), store), config)
}

#[rstest]
#[case(7)]
#[case(1000)]
fn concurrent_add_and_search(#[case] max_vectors: usize) {
    let dir = TempDir::new().unwrap();
    let (engine, config) = engine(dir.path(), max_vectors);
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let writers = (0..WRITERS)
            .map(|w| {
                let engine = &engine;
                s.spawn(move || {
                    for id in w * PER_WRITER..(w + 1) * PER_WRITER {
                        engine.add(&[code(id)], &source(id)).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();

        for offset in 0..2 {
            let (engine, done) = (&engine, &done);
            s.spawn(move || {
                let mut probe = offset;
                while !done.load(Ordering::Acquire) {
                    let stats = engine.stats().unwrap();
                    assert_eq!(stats.total_vectors, stats.total_paths);

                    let id = probe % TOTAL;
                    let result = engine.check_vector(&code(id)).unwrap();
                    if let Some(matched) = &result.matched_source {
                        // 距离为 0 只可能是同一个 id
                        if result.is_match {
                            assert_eq!(matched, &source(id));
                        }
                        assert!(result.matched_path.unwrap().is_file());
                    }
                    probe += 7;
                }
            });
        }

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::Release);
    });

    engine.persist().unwrap();
    let stats = engine.stats().unwrap();
    assert_eq!(stats.total_vectors, TOTAL as usize);
    assert_eq!(stats.total_paths, TOTAL as usize);

    let loaded = ShardManager::load(config.shard).unwrap();
    let indices = (0..TOTAL)
        .map(|id| {
            let best = loaded.search(&code(id), 1).unwrap().remove(0);
            assert_eq!(best.score, 0.);
            assert_eq!(loaded.source(best.index), Some(source(id).as_str()));
            best.index
        })
        .collect::<Vec<_>>();

    // 同一个线程写入的向量保持先后顺序
    for w in 0..WRITERS {
        let own = &indices[(w * PER_WRITER) as usize..((w + 1) * PER_WRITER) as usize];
        assert!(own.windows(2).all(|pair| pair[0] < pair[1]));
    }

    let mut sorted = indices.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, (0..TOTAL).collect::<Vec<_>>());
}
