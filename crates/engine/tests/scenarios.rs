//! End-to-end scenarios driven through the kernel
//!
//! Each test persists a schema, feeds record mutations through
//! `IndexKernel::apply`, and checks the read-side answers of the
//! maintained indexes.

use std::sync::Arc;
use std::time::Duration;

use facet_catalog::{
    EntitySchema, FieldType, IndexDescriptor, IndexKind, KeyExpression, LevelStrategy,
    RecordView, RetentionPolicy, SchemaCatalog, ValueTypeTag,
};
use facet_core::{KernelConfig, ScanLimits, Tuple};
use facet_engine::{AggregateFunction, AggregateValue, IndexKernel};
use facet_index::{
    BitmapIndex, PercentileIndex, RankIndex, Score, ValueIndex, VersionIndex,
};
use facet_kv::MemoryDatabase;

// ============================================================================
// Test Helpers
// ============================================================================

fn kernel_over(db: &MemoryDatabase, schema: EntitySchema) -> IndexKernel {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let catalog = Arc::new(SchemaCatalog::new(Duration::from_secs(300)));
    db.run(|tx| catalog.persist_schema(tx, &schema)).unwrap();
    IndexKernel::new(catalog, KernelConfig::default())
}

fn pk(id: &str) -> Tuple {
    Tuple::new().with(id)
}

// ============================================================================
// S1: scalar insert / delete
// ============================================================================

#[test]
fn s1_scalar_insert_and_delete() {
    let db = MemoryDatabase::new();
    let schema = EntitySchema::new("user")
        .with_field("email", FieldType::String, false, false)
        .with_index(IndexDescriptor::new(
            "user_email",
            IndexKind::Scalar,
            KeyExpression::field("email"),
        ));
    let kernel = kernel_over(&db, schema.clone());

    let user = |id: &str, email: &str| {
        RecordView::new("user", pk(id)).with_field("email", email)
    };

    db.run(|tx| {
        kernel.apply(tx, None, Some(&user("u1", "a@x")))?;
        kernel.apply(tx, None, Some(&user("u2", "b@x")))
    })
    .unwrap();

    db.run(|tx| {
        let result = kernel.scan_index_prefix(
            tx,
            &schema,
            "user_email",
            &Tuple::new(),
            &ScanLimits::default(),
        )?;
        assert_eq!(result.items, vec![pk("u1"), pk("u2")]);
        Ok(())
    })
    .unwrap();

    db.run(|tx| kernel.apply(tx, Some(&user("u1", "a@x")), None))
        .unwrap();
    db.run(|tx| {
        let result = kernel.scan_index_prefix(
            tx,
            &schema,
            "user_email",
            &Tuple::new(),
            &ScanLimits::default(),
        )?;
        assert_eq!(result.items, vec![pk("u2")]);
        Ok(())
    })
    .unwrap();
}

// ============================================================================
// S2 + S3: skip-list rank, top-k, delete
// ============================================================================

fn rank_descriptor() -> IndexDescriptor {
    IndexDescriptor::new(
        "player_rank",
        IndexKind::Rank {
            bucket_size: 100,
            level_strategy: LevelStrategy::Probabilistic,
        },
        KeyExpression::field("score"),
    )
}

fn player(id: &str, score: i64) -> RecordView {
    RecordView::new("player", pk(id)).with_field("score", score)
}

#[test]
fn s2_skip_list_ranks_and_top_k() {
    let db = MemoryDatabase::new();
    let schema = EntitySchema::new("player")
        .with_field("score", FieldType::Int64, false, false)
        .with_index(rank_descriptor());
    let kernel = kernel_over(&db, schema);
    let rank = RankIndex::for_descriptor(&rank_descriptor(), kernel.config());

    db.run(|tx| {
        for (id, score) in [("A", 50), ("B", 30), ("C", 70), ("D", 30), ("E", 90)] {
            kernel.apply(tx, None, Some(&player(id, score)))?;
        }
        Ok(())
    })
    .unwrap();

    db.run(|tx| {
        assert_eq!(rank.rank_of(tx, Score::Int(90), &pk("E"))?, Some(0));
        assert_eq!(rank.rank_of(tx, Score::Int(70), &pk("C"))?, Some(1));
        assert_eq!(rank.rank_of(tx, Score::Int(50), &pk("A"))?, Some(2));
        assert_eq!(rank.rank_of(tx, Score::Int(30), &pk("B"))?, Some(3));
        assert_eq!(rank.rank_of(tx, Score::Int(30), &pk("D"))?, Some(4));

        let top = rank.top_k(tx, 3)?;
        assert_eq!(
            top,
            vec![
                (Score::Int(90), pk("E")),
                (Score::Int(70), pk("C")),
                (Score::Int(50), pk("A")),
            ]
        );
        assert_eq!(rank.count(tx)?, 5);
        rank.verify_integrity(tx)
    })
    .unwrap();
}

#[test]
fn s3_skip_list_delete_reranks() {
    let db = MemoryDatabase::new();
    let schema = EntitySchema::new("player")
        .with_field("score", FieldType::Int64, false, false)
        .with_index(rank_descriptor());
    let kernel = kernel_over(&db, schema);
    let rank = RankIndex::for_descriptor(&rank_descriptor(), kernel.config());

    db.run(|tx| {
        for (id, score) in [("A", 50), ("B", 30), ("C", 70), ("D", 30), ("E", 90)] {
            kernel.apply(tx, None, Some(&player(id, score)))?;
        }
        Ok(())
    })
    .unwrap();

    db.run(|tx| kernel.apply(tx, Some(&player("C", 70)), None))
        .unwrap();

    db.run(|tx| {
        assert_eq!(rank.rank_of(tx, Score::Int(90), &pk("E"))?, Some(0));
        assert_eq!(rank.rank_of(tx, Score::Int(50), &pk("A"))?, Some(1));
        assert_eq!(rank.rank_of(tx, Score::Int(30), &pk("B"))?, Some(2));
        assert_eq!(rank.rank_of(tx, Score::Int(30), &pk("D"))?, Some(3));
        assert_eq!(rank.count(tx)?, 4);
        rank.verify_integrity(tx)
    })
    .unwrap();
}

// ============================================================================
// S4: sum + average
// ============================================================================

#[test]
fn s4_sum_and_average_by_region() {
    let db = MemoryDatabase::new();
    let schema = EntitySchema::new("order")
        .with_field("region", FieldType::String, false, false)
        .with_field("amount", FieldType::Int64, false, false)
        .with_index(IndexDescriptor::new(
            "order_sum",
            IndexKind::Sum {
                value_type: ValueTypeTag::I64,
            },
            KeyExpression::fields(&["region", "amount"]),
        ))
        .with_index(IndexDescriptor::new(
            "order_avg",
            IndexKind::Average {
                value_type: ValueTypeTag::I64,
            },
            KeyExpression::fields(&["region", "amount"]),
        ));
    let kernel = kernel_over(&db, schema.clone());

    let order = |id: &str, region: &str, amount: i64| {
        RecordView::new("order", pk(id))
            .with_field("region", region)
            .with_field("amount", amount)
    };

    db.run(|tx| {
        kernel.apply(tx, None, Some(&order("o1", "T", 100)))?;
        kernel.apply(tx, None, Some(&order("o2", "T", 200)))?;
        kernel.apply(tx, None, Some(&order("o3", "O", 150)))
    })
    .unwrap();

    let sum_of = |region: &str| {
        db.run(|tx| {
            kernel.aggregate(
                tx,
                &schema,
                AggregateFunction::Sum,
                &["region"],
                Some("amount"),
                &Tuple::new().with(region),
                None,
            )
        })
        .unwrap()
    };
    let avg_of = |region: &str| {
        db.run(|tx| {
            kernel.aggregate(
                tx,
                &schema,
                AggregateFunction::Average,
                &["region"],
                Some("amount"),
                &Tuple::new().with(region),
                None,
            )
        })
        .unwrap()
    };

    assert_eq!(sum_of("T"), AggregateValue::Sum(300.0));
    assert_eq!(sum_of("O"), AggregateValue::Sum(150.0));
    assert_eq!(avg_of("T"), AggregateValue::Average(Some(150.0)));
    assert_eq!(avg_of("O"), AggregateValue::Average(Some(150.0)));

    db.run(|tx| kernel.apply(tx, Some(&order("o1", "T", 100)), None))
        .unwrap();

    assert_eq!(sum_of("T"), AggregateValue::Sum(200.0));
    assert_eq!(avg_of("T"), AggregateValue::Average(Some(200.0)));
}

// ============================================================================
// S5: min with tie-break
// ============================================================================

#[test]
fn s5_min_tie_break_protocol() {
    let db = MemoryDatabase::new();
    let schema = EntitySchema::new("item")
        .with_field("grp", FieldType::String, false, false)
        .with_field("value", FieldType::Int64, false, false)
        .with_index(IndexDescriptor::new(
            "item_min",
            IndexKind::Min {
                value_type: ValueTypeTag::I64,
            },
            KeyExpression::fields(&["grp", "value"]),
        ));
    let kernel = kernel_over(&db, schema.clone());

    let item = |id: &str, value: i64| {
        RecordView::new("item", pk(id))
            .with_field("grp", "g")
            .with_field("value", value)
    };
    let min_of = || {
        db.run(|tx| {
            kernel.aggregate(
                tx,
                &schema,
                AggregateFunction::Min,
                &["grp"],
                Some("value"),
                &Tuple::new().with("g"),
                None,
            )
        })
        .unwrap()
    };

    db.run(|tx| {
        kernel.apply(tx, None, Some(&item("p1", 10)))?;
        kernel.apply(tx, None, Some(&item("p2", 5)))?;
        kernel.apply(tx, None, Some(&item("p3", 5)))
    })
    .unwrap();
    assert_eq!(min_of(), AggregateValue::Extremum(Some(5.0)));

    db.run(|tx| kernel.apply(tx, Some(&item("p2", 5)), None))
        .unwrap();
    assert_eq!(min_of(), AggregateValue::Extremum(Some(5.0)));

    db.run(|tx| kernel.apply(tx, Some(&item("p3", 5)), None))
        .unwrap();
    assert_eq!(min_of(), AggregateValue::Extremum(Some(10.0)));
}

// ============================================================================
// S6: bitmap OR
// ============================================================================

#[test]
fn s6_bitmap_or_over_categories() {
    let db = MemoryDatabase::new();
    let descriptor = IndexDescriptor::new(
        "product_category",
        IndexKind::Bitmap,
        KeyExpression::field("category"),
    );
    let schema = EntitySchema::new("product")
        .with_field("category", FieldType::String, false, false)
        .with_index(descriptor.clone());
    let kernel = kernel_over(&db, schema);
    let bitmap = BitmapIndex::for_descriptor(&descriptor);

    db.run(|tx| {
        for (i, category) in ["a", "b", "c"].iter().enumerate() {
            for n in 0..100 {
                let record = RecordView::new(
                    "product",
                    pk(&format!("p{}{:03}", i, n)),
                )
                .with_field("category", *category);
                kernel.apply(tx, None, Some(&record))?;
            }
        }
        Ok(())
    })
    .unwrap();

    db.run(|tx| {
        let union = bitmap.or_query(
            tx,
            &[Tuple::new().with("a"), Tuple::new().with("b")],
        )?;
        assert_eq!(union.cardinality(), 200);

        let mut pks = bitmap.get_primary_keys(tx, &union)?;
        pks.sort_by_key(|t| t.pack());
        let mut expected: Vec<Tuple> = (0..100)
            .map(|n| pk(&format!("p0{:03}", n)))
            .chain((0..100).map(|n| pk(&format!("p1{:03}", n))))
            .collect();
        expected.sort_by_key(|t| t.pack());
        assert_eq!(pks, expected);
        Ok(())
    })
    .unwrap();
}

// ============================================================================
// S7: versioned history with keep-last
// ============================================================================

#[test]
fn s7_versioned_history_keeps_last_five() {
    let db = MemoryDatabase::new();
    let descriptor = IndexDescriptor::new(
        "doc_history",
        IndexKind::Version {
            retention: RetentionPolicy::KeepLast { count: 5 },
        },
        KeyExpression::Versionstamp,
    );
    let schema = EntitySchema::new("doc")
        .with_field("body", FieldType::String, false, false)
        .with_index(descriptor.clone());
    let kernel = kernel_over(&db, schema);
    let history = VersionIndex::for_descriptor(&descriptor);

    for i in 0..10 {
        let body = format!("rev{}", i);
        let record = RecordView::new("doc", pk("doc1"))
            .with_field("body", body.as_str())
            .with_raw_bytes(body.as_bytes().to_vec());
        db.run(|tx| kernel.apply(tx, None, Some(&record))).unwrap();
    }

    db.run(|tx| {
        let versions = history.get_version_history(tx, &pk("doc1"), None)?;
        assert_eq!(versions.len(), 5);
        for pair in versions.windows(2) {
            assert!(pair[0].versionstamp > pair[1].versionstamp);
        }
        assert_eq!(versions[0].record.as_deref(), Some(b"rev9".as_slice()));
        let latest = history.get_latest_version(tx, &pk("doc1"))?.unwrap();
        assert_eq!(latest, versions[0].versionstamp);
        Ok(())
    })
    .unwrap();
}

// ============================================================================
// S8: percentiles
// ============================================================================

#[test]
fn s8_latency_percentiles() {
    let db = MemoryDatabase::new();
    let descriptor = IndexDescriptor::new(
        "latency_digest",
        IndexKind::Percentile {
            compression: 100.0,
            shard_count: 1,
        },
        KeyExpression::fields(&["route", "latency"]),
    );
    let schema = EntitySchema::new("sample")
        .with_field("route", FieldType::String, false, false)
        .with_field("latency", FieldType::Int64, false, false)
        .with_index(descriptor.clone());
    let kernel = kernel_over(&db, schema);
    let digest = PercentileIndex::for_descriptor(&descriptor);

    db.run(|tx| {
        for i in 1..=100i64 {
            let record = RecordView::new("sample", pk(&format!("s{:03}", i)))
                .with_field("route", "/api/u")
                .with_field("latency", i);
            kernel.apply(tx, None, Some(&record))?;
        }
        Ok(())
    })
    .unwrap();

    db.run(|tx| {
        let group = Tuple::new().with("/api/u");
        let p50 = digest.get_percentile(tx, &group, 0.5)?.unwrap();
        let p90 = digest.get_percentile(tx, &group, 0.9)?.unwrap();
        let p99 = digest.get_percentile(tx, &group, 0.99)?.unwrap();
        assert!((45.0..=55.0).contains(&p50), "p50 = {}", p50);
        assert!((85.0..=95.0).contains(&p90), "p90 = {}", p90);
        assert!((95.0..=100.0).contains(&p99), "p99 = {}", p99);

        let stats = digest.get_statistics(tx, &group)?.unwrap();
        assert_eq!(stats.count, 100);
        assert!((stats.min - 1.0).abs() < 0.5);
        assert!((stats.max - 100.0).abs() < 0.5);
        Ok(())
    })
    .unwrap();
}

// ============================================================================
// Cross-index atomicity
// ============================================================================

#[test]
fn uniqueness_violation_aborts_sibling_indexes() {
    let db = MemoryDatabase::new();
    let schema = EntitySchema::new("user")
        .with_field("email", FieldType::String, false, false)
        .with_index(
            IndexDescriptor::new(
                "unique_email",
                IndexKind::Scalar,
                KeyExpression::field("email"),
            )
            .with_uniqueness(facet_core::UniquenessMode::Immediate),
        )
        .with_index(IndexDescriptor::new(
            "email_count",
            IndexKind::Count,
            KeyExpression::field("email"),
        ));
    let kernel = kernel_over(&db, schema.clone());

    let user = |id: &str, email: &str| {
        RecordView::new("user", pk(id)).with_field("email", email)
    };

    db.run(|tx| kernel.apply(tx, None, Some(&user("u1", "a@x"))))
        .unwrap();

    // The duplicate fails the transaction; no sibling index moves.
    let err = db
        .run(|tx| kernel.apply(tx, None, Some(&user("u2", "a@x"))))
        .unwrap_err();
    assert!(matches!(
        err,
        facet_core::Error::UniquenessViolation { .. }
    ));

    let count = db
        .run(|tx| {
            kernel.aggregate(
                tx,
                &schema,
                AggregateFunction::Count,
                &["email"],
                None,
                &Tuple::new().with("a@x"),
                None,
            )
        })
        .unwrap();
    assert_eq!(count, AggregateValue::Count(1));

    let value = ValueIndex::for_descriptor(schema.index("unique_email").unwrap());
    db.run(|tx| {
        let hits = value.scan_by_exact_match(
            tx,
            &Tuple::new().with("a@x"),
            &ScanLimits::default(),
        )?;
        assert_eq!(hits.items, vec![pk("u1")]);
        Ok(())
    })
    .unwrap();
}
