#![allow(missing_docs)]
#![allow(unsafe_code)]

use std::ptr;
use std::sync::Arc;

use rdftab::catalog::{Class, Property};
use rdftab::schema::{attach_graph, create_graph_tables, create_registry};
use rdftab::types::ClassId;
use rdftab::{
    register, AdapterOptions, DataType, GraphId, Ontology, PropertyId, SchemaGeneration,
};
use rusqlite::{ffi, Connection, ErrorCode};

const SIZE: i64 = 10;
const TITLE: i64 = 11;
const TAG: i64 = 12;

fn ontology(generation: SchemaGeneration) -> Ontology {
    let prop = |id: i64, name: &str, data_type, multi_valued| Property {
        id: PropertyId(id),
        uri: format!("http://example.org/{name}"),
        storage_name: format!("ex:{name}"),
        data_type,
        multi_valued,
        owning_class: Some(ClassId(1)),
    };
    Ontology::builder(generation)
        .class(Class {
            id: ClassId(1),
            uri: "http://example.org/Doc".into(),
            storage_name: "ex:Doc".into(),
        })
        .property(prop(SIZE, "size", DataType::Integer, false))
        .property(prop(TITLE, "title", DataType::String, false))
        .property(prop(TAG, "tag", DataType::String, true))
        .build()
        .expect("ontology")
}

fn open_store(generation: SchemaGeneration) -> (Connection, Arc<Ontology>) {
    let conn = Connection::open_in_memory().expect("open");
    let opts = AdapterOptions::default();
    let onto = Arc::new(ontology(generation));
    create_registry(&conn, &opts).expect("registry");
    create_graph_tables(&conn, &*onto, None).expect("graph tables");
    (conn, onto)
}

fn install(conn: &Connection, onto: &Arc<Ontology>, generation: SchemaGeneration) {
    let opts = AdapterOptions {
        generation,
        ..AdapterOptions::default()
    };
    register(conn, Arc::clone(onto) as Arc<dyn rdftab::Catalog>, opts).expect("register");
}

type Row = (Option<i64>, i64, i64, Option<String>, i64);

fn triples(conn: &Connection, filter: &str, params: &[i64]) -> Vec<Row> {
    let sql = format!(
        "SELECT graph, subject, predicate, object, object_type FROM triples {filter}"
    );
    let mut stmt = conn.prepare(&sql).expect("prepare");
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })
        .expect("query");
    rows.collect::<Result<Vec<_>, _>>().expect("rows")
}

fn open_statements(conn: &Connection) -> usize {
    let mut count = 0;
    // SAFETY: walking the statement list of a live connection without touching the statements.
    unsafe {
        let db = conn.handle();
        let mut stmt = ffi::sqlite3_next_stmt(db, ptr::null_mut());
        while !stmt.is_null() {
            count += 1;
            stmt = ffi::sqlite3_next_stmt(db, stmt);
        }
    }
    count
}

#[test]
fn predicate_equality_surfaces_single_triple() {
    let generation = SchemaGeneration::PerProperty;
    let (conn, onto) = open_store(generation);
    conn.execute("INSERT INTO \"ex:size\" VALUES (5, 42)", [])
        .expect("seed");
    install(&conn, &onto, generation);

    let rows = triples(&conn, "WHERE predicate = ?1", &[SIZE]);
    assert_eq!(rows, vec![(None, 5, SIZE, Some("42".into()), 3)]);

    let rows = triples(&conn, "WHERE predicate != ?1", &[SIZE]);
    assert!(rows.is_empty(), "negation must exclude the only property with data");
}

#[test]
fn class_grouped_layout_walks_columns_then_multi_valued_tables() {
    let generation = SchemaGeneration::ClassGrouped;
    let (conn, onto) = open_store(generation);
    conn.execute_batch(
        "INSERT INTO \"ex:Doc\" (ID, \"ex:size\", \"ex:title\") VALUES (1, 10, 'x'), (2, NULL, 'y');
         INSERT INTO \"ex:tag\" VALUES (1, 'a');",
    )
    .expect("seed");
    install(&conn, &onto, generation);

    let all: Vec<(i64, i64, Option<String>)> = triples(&conn, "", &[])
        .into_iter()
        .map(|(_, s, p, o, _)| (s, p, o))
        .collect();
    assert_eq!(
        all,
        vec![
            (1, SIZE, Some("10".into())),
            (1, TITLE, Some("x".into())),
            (2, TITLE, Some("y".into())),
            (1, TAG, Some("a".into())),
        ]
    );

    let rest: Vec<i64> = triples(&conn, "WHERE predicate != ?1", &[SIZE])
        .into_iter()
        .map(|(_, _, p, _, _)| p)
        .collect();
    assert_eq!(rest, vec![TITLE, TITLE, TAG]);

    let one = triples(&conn, "WHERE subject = ?1 AND predicate = ?2", &[2, TITLE]);
    assert_eq!(one, vec![(None, 2, TITLE, Some("y".into()), 1)]);

    let err = conn.prepare("SELECT id FROM triples").unwrap_err();
    assert!(err.to_string().contains("id"));
}

#[test]
fn named_graphs_follow_registry_and_default_graph_is_null() {
    let generation = SchemaGeneration::PerProperty;
    let (conn, onto) = open_store(generation);
    let opts = AdapterOptions::default();
    attach_graph(&conn, &*onto, &opts, GraphId(3), "g3", ":memory:").expect("attach");
    conn.execute_batch(
        "INSERT INTO \"ex:size\" VALUES (5, 42);
         INSERT INTO \"g3\".\"ex:size\" VALUES (8, 99);",
    )
    .expect("seed");
    install(&conn, &onto, generation);

    let graphs = |filter: &str, params: &[i64]| -> Vec<(Option<i64>, i64)> {
        triples(&conn, filter, params)
            .into_iter()
            .map(|(g, s, _, _, _)| (g, s))
            .collect()
    };
    assert_eq!(graphs("", &[]), vec![(None, 5), (Some(3), 8)]);
    assert_eq!(graphs("WHERE graph = ?1", &[3]), vec![(Some(3), 8)]);
    assert_eq!(graphs("WHERE graph != ?1", &[3]), vec![(None, 5)]);
    assert_eq!(graphs("WHERE graph IS NULL", &[]), vec![(None, 5)]);
    assert_eq!(graphs("WHERE graph IS NOT NULL", &[]), vec![(Some(3), 8)]);
    assert!(graphs("WHERE graph = ?1", &[4]).is_empty());
}

#[test]
fn predicate_null_tests_match_nothing_or_everything() {
    let layouts = [
        (
            SchemaGeneration::ClassGrouped,
            "INSERT INTO \"ex:Doc\" (ID, \"ex:size\", \"ex:title\") VALUES (1, 10, 'x'), (2, NULL, 'y');
             INSERT INTO \"ex:tag\" VALUES (1, 'a');",
            4,
        ),
        (
            SchemaGeneration::PerProperty,
            "INSERT INTO \"ex:size\" VALUES (1, 10), (2, 20);
             INSERT INTO \"ex:title\" VALUES (1, 'x');
             INSERT INTO \"ex:tag\" VALUES (1, 'a'), (2, 'b');",
            5,
        ),
    ];
    for (generation, seed, expected) in layouts {
        let (conn, onto) = open_store(generation);
        conn.execute_batch(seed).expect("seed");
        install(&conn, &onto, generation);

        let all = triples(&conn, "", &[]);
        assert_eq!(all.len(), expected, "{generation:?}");
        assert!(
            triples(&conn, "WHERE predicate IS NULL", &[]).is_empty(),
            "{generation:?}"
        );
        assert_eq!(
            triples(&conn, "WHERE predicate IS NOT NULL", &[]),
            all,
            "{generation:?}"
        );
    }
}

#[test]
fn subject_filters_push_down_into_physical_selects() {
    let generation = SchemaGeneration::PerProperty;
    let (conn, onto) = open_store(generation);
    conn.execute_batch(
        "INSERT INTO \"ex:size\" VALUES (1, 10), (2, 20);
         INSERT INTO \"ex:tag\" VALUES (1, 'a'), (1, 'b'), (2, 'c');",
    )
    .expect("seed");
    install(&conn, &onto, generation);

    let subjects: Vec<i64> = triples(&conn, "WHERE subject != ?1", &[1])
        .into_iter()
        .map(|(_, s, _, _, _)| s)
        .collect();
    assert_eq!(subjects, vec![2, 2]);

    let tags: Vec<Option<String>> = triples(&conn, "WHERE subject = ?1 AND predicate = ?2", &[1, TAG])
        .into_iter()
        .map(|(_, _, _, o, _)| o)
        .collect();
    assert_eq!(tags, vec![Some("a".into()), Some("b".into())]);

    assert!(triples(&conn, "WHERE subject IS NULL", &[]).is_empty());
}

#[test]
fn object_filters_are_left_to_the_engine() {
    let generation = SchemaGeneration::PerProperty;
    let (conn, onto) = open_store(generation);
    conn.execute_batch(
        "INSERT INTO \"ex:title\" VALUES (1, 'alpha'), (2, 'beta');
         INSERT INTO \"ex:size\" VALUES (3, 42);",
    )
    .expect("seed");
    install(&conn, &onto, generation);

    let rows = triples(&conn, "WHERE object LIKE 'b%'", &[]);
    assert_eq!(rows, vec![(None, 2, TITLE, Some("beta".into()), 1)]);
    let rows = triples(&conn, "WHERE object = '42' AND object_type = 3", &[]);
    assert_eq!(rows.len(), 1);
    let limited = triples(&conn, "LIMIT 2", &[]);
    assert_eq!(limited.len(), 2);
}

#[test]
fn synthetic_id_counts_rows_per_scan() {
    let generation = SchemaGeneration::PerProperty;
    let (conn, onto) = open_store(generation);
    conn.execute_batch(
        "INSERT INTO \"ex:size\" VALUES (1, 10), (2, 20);
         INSERT INTO \"ex:title\" VALUES (1, 't');",
    )
    .expect("seed");
    install(&conn, &onto, generation);

    for _ in 0..2 {
        let mut stmt = conn.prepare("SELECT id, rowid FROM triples").expect("prepare");
        let ids: Vec<(i64, i64)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("rows");
        assert_eq!(ids, vec![(1, 1), (2, 2), (3, 3)]);
    }
}

#[test]
fn unsupported_key_operator_fails_planning() {
    let generation = SchemaGeneration::PerProperty;
    let (conn, onto) = open_store(generation);
    install(&conn, &onto, generation);
    let err = conn
        .prepare("SELECT * FROM triples WHERE subject > 3")
        .unwrap_err();
    assert!(err.to_string().contains("unsupported"), "{err}");
}

#[test]
fn statements_are_released_after_partial_and_full_scans() {
    let generation = SchemaGeneration::PerProperty;
    let (conn, onto) = open_store(generation);
    conn.execute_batch(
        "INSERT INTO \"ex:size\" VALUES (1, 10), (2, 20);
         INSERT INTO \"ex:title\" VALUES (1, 'a');
         INSERT INTO \"ex:tag\" VALUES (1, 'x'), (2, 'y');",
    )
    .expect("seed");
    install(&conn, &onto, generation);
    assert_eq!(open_statements(&conn), 0);

    {
        let mut stmt = conn.prepare("SELECT object FROM triples").expect("prepare");
        let mut rows = stmt.query([]).expect("query");
        let mut seen = 0;
        while let Some(_row) = rows.next().expect("row") {
            seen += 1;
            // the outer statement plus at most one physical select
            assert!(open_statements(&conn) <= 2);
            if seen == 3 {
                break;
            }
        }
    }
    assert_eq!(open_statements(&conn), 0);

    assert_eq!(triples(&conn, "", &[]).len(), 5);
    assert_eq!(open_statements(&conn), 0);
}

#[test]
fn independent_cursors_do_not_share_state() {
    let generation = SchemaGeneration::PerProperty;
    let (conn, onto) = open_store(generation);
    conn.execute_batch("INSERT INTO \"ex:size\" VALUES (1, 10), (2, 20);")
        .expect("seed");
    install(&conn, &onto, generation);

    let mut stmt = conn
        .prepare(
            "SELECT a.subject, b.subject FROM triples AS a, triples AS b \
             WHERE a.predicate = ?1 AND b.predicate = ?1 ORDER BY 1, 2",
        )
        .expect("prepare");
    let pairs: Vec<(i64, i64)> = stmt
        .query_map([SIZE], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows");
    assert_eq!(pairs, vec![(1, 1), (1, 2), (2, 1), (2, 2)]);
}

#[test]
fn unknown_column_name_reports_corruption() {
    struct Amnesiac(Ontology);

    impl rdftab::Catalog for Amnesiac {
        fn generation(&self) -> SchemaGeneration {
            self.0.generation()
        }
        fn properties(&self) -> &[Arc<Property>] {
            self.0.properties()
        }
        fn property(&self, id: PropertyId) -> Option<Arc<Property>> {
            self.0.property(id)
        }
        fn property_by_column(&self, _name: &str) -> Option<Arc<Property>> {
            None
        }
        fn class(&self, id: ClassId) -> Option<Arc<Class>> {
            self.0.class(id)
        }
        fn graphs(&self, conn: &Connection) -> rdftab::Result<Vec<rdftab::Graph>> {
            self.0.graphs(conn)
        }
        fn resource_table(&self) -> &str {
            self.0.resource_table()
        }
    }

    let generation = SchemaGeneration::PerProperty;
    let (conn, onto) = open_store(generation);
    conn.execute("INSERT INTO \"ex:size\" VALUES (5, 42)", [])
        .expect("seed");
    let catalog = Arc::new(Amnesiac(ontology(generation)));
    drop(onto);
    register(&conn, catalog, AdapterOptions::default()).expect("register");

    for filter in ["WHERE predicate != 99", ""] {
        let sql = format!("SELECT predicate FROM triples {filter}");
        let mut stmt = conn.prepare(&sql).expect("prepare");
        let err = stmt
            .query_row([], |row| row.get::<_, i64>(0))
            .unwrap_err();
        assert_eq!(err.sqlite_error_code(), Some(ErrorCode::DatabaseCorrupt), "{err}");
    }
}
