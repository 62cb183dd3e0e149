//! End-to-end parse/serialize behavior across backends and policies.

use tmx_rs::{
    parse_file, parse_str, parse_with, to_xml_string, write_file, ArenaBackend,
    DeserializationError, DeserializationPolicy, InlineItem, PolicyValue, SerializationPolicy,
    Serializer, SimpleBackend, TmxReader,
};

const SAMPLE: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>",
    "<tmx version=\"1.4\">",
    "<header creationtool=\"demo\" creationtoolversion=\"1.0\" segtype=\"sentence\" ",
    "o-tmf=\"tmx\" adminlang=\"en\" srclang=\"en\" datatype=\"plaintext\" ",
    "creationdate=\"20020125T191234Z\" creationid=\"alice\">",
    "<note>file-wide note</note>",
    "<prop type=\"domain\">greetings</prop>",
    "</header>",
    "<body>",
    "<tu tuid=\"1\" usagecount=\"12\" creationdate=\"20020125T191234Z\">",
    "<note xml:lang=\"en\">unit note</note>",
    "<prop type=\"project\">hello</prop>",
    "<tuv xml:lang=\"en\" creationid=\"alice\">",
    "<seg>Hello, <bpt i=\"1\" type=\"bold\">&lt;b&gt;</bpt>world<ept i=\"1\">&lt;/b&gt;</ept>!</seg>",
    "</tuv>",
    "<tuv xml:lang=\"fr\">",
    "<seg>Bonjour, le monde!</seg>",
    "</tuv>",
    "</tu>",
    "<tu tuid=\"2\">",
    "<tuv xml:lang=\"en\"><seg>A <ph x=\"1\" assoc=\"p\">%s</ph> placeholder and ",
    "<it pos=\"begin\" type=\"link\">&lt;a href=\"#\"&gt;</it>an open link</seg></tuv>",
    "<tuv xml:lang=\"fr\"><seg>Un espace r\u{e9}serv\u{e9} <ph x=\"1\">%s</ph></seg></tuv>",
    "</tu>",
    "</body>",
    "</tmx>",
);

#[test]
fn round_trip_preserves_model_exactly() {
    let strict = DeserializationPolicy::strict();
    let first = parse_str(SAMPLE, &strict).unwrap();
    let xml = to_xml_string(&first, &SerializationPolicy::default()).unwrap();
    let second = parse_str(&xml, &strict).unwrap();
    assert_eq!(first, second);
}

#[test]
fn english_and_french_variants_read_back() {
    let tmx = parse_str(SAMPLE, &DeserializationPolicy::default()).unwrap();
    let tu = &tmx.body[0];
    assert_eq!(tu.tuid.as_deref(), Some("1"));
    assert_eq!(tu.variant("en").unwrap().seg.plain_text(), "Hello, world!");
    assert_eq!(tu.variant("fr").unwrap().seg.plain_text(), "Bonjour, le monde!");
    assert_eq!(tu.usagecount, Some(12));
    assert_eq!(tu.notes[0].text, "unit note");
}

#[test]
fn unmatched_ept_raises_under_strict_policy() {
    let xml = SAMPLE.replace(
        "<seg>Bonjour, le monde!</seg>",
        "<seg>Bonjour<ept i=\"2\">[/b]</ept></seg>",
    );
    let err = parse_str(&xml, &DeserializationPolicy::strict()).unwrap_err();
    match err {
        DeserializationError::Reference { path, message } => {
            assert!(path.contains("tu[0]"), "path was {}", path);
            assert!(message.contains("no matching bpt"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn unmatched_ept_dropped_under_ignoring_policy() {
    let xml = SAMPLE.replace(
        "<seg>Bonjour, le monde!</seg>",
        "<seg>Bonjour<ept i=\"2\">[/b]</ept></seg>",
    );
    let mut policy = DeserializationPolicy::default();
    policy.unmatched_pair = PolicyValue::ignore();
    let tmx = parse_str(&xml, &policy).unwrap();
    let seg = &tmx.body[0].variant("fr").unwrap().seg;
    assert_eq!(seg.items, vec![InlineItem::Text("Bonjour".to_string())]);
}

#[test]
fn missing_srclang_honors_default_policy() {
    let xml = SAMPLE.replace(" srclang=\"en\"", "");
    assert!(parse_str(&xml, &DeserializationPolicy::default()).is_err());

    let mut policy = DeserializationPolicy::default();
    policy.missing_required_attribute = PolicyValue::default_to("en");
    let tmx = parse_str(&xml, &policy).unwrap();
    assert_eq!(tmx.header.srclang, "en");
}

#[test]
fn cross_backend_round_trip_is_identical() {
    let policy = DeserializationPolicy::strict();
    let via_simple = parse_with(SimpleBackend::new(), SAMPLE.as_bytes(), &policy).unwrap();
    let via_arena = parse_with(ArenaBackend::new(), SAMPLE.as_bytes(), &policy).unwrap();
    assert_eq!(via_simple, via_arena);

    // Serialize through the arena, reparse through the rc tree.
    let arena = ArenaBackend::new();
    let root = Serializer::new(arena.clone(), SerializationPolicy::default())
        .serialize(&via_arena)
        .unwrap();
    let xml = tmx_rs::xml::write_to_string(&arena, &root).unwrap();
    let back = parse_with(SimpleBackend::new(), xml.as_bytes(), &policy).unwrap();
    assert_eq!(back, via_simple);
}

#[test]
fn streaming_matches_whole_document_parse() {
    let tmx = parse_str(SAMPLE, &DeserializationPolicy::default()).unwrap();
    let reader = TmxReader::new(
        SimpleBackend::new(),
        SAMPLE.as_bytes(),
        DeserializationPolicy::default(),
    );
    let streamed: Vec<_> = reader.map(|tu| tu.unwrap()).collect();
    assert_eq!(streamed, tmx.body);
}

#[test]
fn streaming_large_generated_document() {
    let mut doc = String::from(
        "<tmx version=\"1.4\"><header creationtool=\"gen\" creationtoolversion=\"1\" \
         segtype=\"sentence\" o-tmf=\"tmx\" adminlang=\"en\" srclang=\"en\" \
         datatype=\"plaintext\" /><body>",
    );
    for i in 0..2000 {
        doc.push_str(&format!(
            "<tu tuid=\"u{0}\"><tuv xml:lang=\"en\"><seg>segment number {0}</seg></tuv>\
             <tuv xml:lang=\"fr\"><seg>segment num\u{e9}ro {0}</seg></tuv></tu>",
            i
        ));
    }
    doc.push_str("</body></tmx>");

    let reader = TmxReader::new(
        SimpleBackend::new(),
        std::io::Cursor::new(doc),
        DeserializationPolicy::default(),
    );
    let mut count = 0usize;
    for tu in reader {
        let tu = tu.unwrap();
        assert_eq!(tu.variants.len(), 2);
        count += 1;
    }
    assert_eq!(count, 2000);
}

#[test]
fn file_round_trip_through_tempdir() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.tmx");

    let tmx = parse_str(SAMPLE, &DeserializationPolicy::strict()).unwrap();
    write_file(&tmx, &SerializationPolicy::default(), &path).unwrap();
    let reread = parse_file(&path, &DeserializationPolicy::strict()).unwrap();
    assert_eq!(tmx, reread);
}

#[test]
fn serialized_output_is_stable() {
    let tmx = parse_str(SAMPLE, &DeserializationPolicy::strict()).unwrap();
    let once = to_xml_string(&tmx, &SerializationPolicy::default()).unwrap();
    let again = to_xml_string(
        &parse_str(&once, &DeserializationPolicy::strict()).unwrap(),
        &SerializationPolicy::default(),
    )
    .unwrap();
    assert_eq!(once, again);
}
