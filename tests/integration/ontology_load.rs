#![allow(missing_docs)]

use rdftab::catalog::{Class, Property};
use rdftab::schema::{create_registry, store_ontology};
use rdftab::types::ClassId;
use rdftab::{AdapterOptions, Catalog, DataType, Ontology, PropertyId, RdfError, SchemaGeneration};
use rusqlite::Connection;

fn registry() -> (Connection, AdapterOptions) {
    let conn = Connection::open_in_memory().expect("open");
    let opts = AdapterOptions::default();
    create_registry(&conn, &opts).expect("registry");
    (conn, opts)
}

#[test]
fn loads_descriptors_in_id_order() {
    let (conn, opts) = registry();
    conn.execute_batch(
        "INSERT INTO rdf_class VALUES (1, 'http://example.org/Doc', 'ex:Doc');
         INSERT INTO rdf_property VALUES (20, 'http://example.org/tag', 'ex:tag', 1, 1, 1);
         INSERT INTO rdf_property VALUES (5, 'http://example.org/size', 'ex:size', 3, 0, 1);
         INSERT INTO rdf_property VALUES (9, 'http://example.org/seeAlso', 'ex:seeAlso', 7, 0, NULL);",
    )
    .expect("seed");

    let onto = Ontology::load(&conn, SchemaGeneration::ClassGrouped, &opts).expect("load");
    let ids: Vec<i64> = onto.properties().iter().map(|p| p.id.0).collect();
    assert_eq!(ids, vec![5, 9, 20]);
    assert_eq!(onto.classes().len(), 1);

    let size = onto.property(PropertyId(5)).expect("size");
    assert_eq!(size.data_type, DataType::Integer);
    assert!(size.is_class_column(SchemaGeneration::ClassGrouped));
    let tag = onto.property_by_column("ex:tag").expect("tag");
    assert!(tag.multi_valued);
    assert!(!tag.is_class_column(SchemaGeneration::ClassGrouped));
    let see_also = onto.property(PropertyId(9)).expect("seeAlso");
    assert_eq!(see_also.owning_class, None);
    assert_eq!(see_also.data_type, DataType::Resource);
    assert_eq!(onto.resource_table(), "Resource");
}

#[test]
fn stored_ontology_loads_back() {
    let (conn, opts) = registry();
    let onto = Ontology::builder(SchemaGeneration::PerProperty)
        .class(Class {
            id: ClassId(3),
            uri: "http://example.org/Person".into(),
            storage_name: "ex:Person".into(),
        })
        .property(Property {
            id: PropertyId(31),
            uri: "http://example.org/name".into(),
            storage_name: "ex:name".into(),
            data_type: DataType::LangString,
            multi_valued: false,
            owning_class: Some(ClassId(3)),
        })
        .build()
        .expect("build");
    store_ontology(&conn, &onto, &opts).expect("store");
    // storing twice replaces rather than duplicates
    store_ontology(&conn, &onto, &opts).expect("store again");

    let loaded = Ontology::load(&conn, SchemaGeneration::PerProperty, &opts).expect("load");
    assert_eq!(loaded.properties(), onto.properties());
    assert_eq!(loaded.classes(), onto.classes());
}

#[test]
fn dangling_class_reference_is_corruption() {
    let (conn, opts) = registry();
    conn.execute(
        "INSERT INTO rdf_property VALUES (1, 'http://example.org/p', 'ex:p', 1, 0, 42)",
        [],
    )
    .expect("seed");
    let err = Ontology::load(&conn, SchemaGeneration::ClassGrouped, &opts).unwrap_err();
    assert!(err.is_corruption(), "{err}");
}

#[test]
fn missing_ontology_tables_surface_engine_errors() {
    let conn = Connection::open_in_memory().expect("open");
    let err = Ontology::load(&conn, SchemaGeneration::PerProperty, &AdapterOptions::default())
        .unwrap_err();
    assert!(matches!(err, RdfError::Sqlite(_)), "{err}");
}

#[test]
fn custom_table_names_are_honoured() {
    let conn = Connection::open_in_memory().expect("open");
    let opts = AdapterOptions {
        class_table: "classes".into(),
        property_table: "props".into(),
        graph_table: "graphs".into(),
        resource_table: "things".into(),
        ..AdapterOptions::default()
    };
    create_registry(&conn, &opts).expect("registry");
    conn.execute(
        "INSERT INTO props VALUES (1, 'http://example.org/p', 'ex:p', 1, 0, NULL)",
        [],
    )
    .expect("seed");
    conn.execute("INSERT INTO graphs VALUES (4, 'g4')", [])
        .expect("graph");

    let onto = Ontology::load(&conn, SchemaGeneration::PerProperty, &opts).expect("load");
    assert_eq!(onto.properties().len(), 1);
    assert_eq!(onto.resource_table(), "things");
    let graphs = onto.graphs(&conn).expect("graphs");
    assert_eq!(graphs.len(), 1);
    assert_eq!(graphs[0].name.as_deref(), Some("g4"));
}
