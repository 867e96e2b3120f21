use crate::{lookup_url, parse_lookup_response};
use common::cell::CellRegistration;

#[test]
fn build_lookup_url_with_all_cell_identifiers() {
    let registration = CellRegistration::new(244, 5, 15, 58);
    assert_eq!(
        lookup_url("http://cells.example.org/cell/get", &registration),
        "http://cells.example.org/cell/get?mcc=244&mnc=5&lac=15&cellid=58"
    );
}

#[test]
fn parse_response_with_cell_element() {
    let body = r#"<rsp stat="ok"><cell lat="60.17" lon="24.93" range="6000"/></rsp>"#;
    assert_eq!(parse_lookup_response(body), Some((60.17, 24.93)));
}

#[test]
fn parse_uses_the_first_cell_element() {
    let body = r#"<rsp><cell lat="60.17" lon="24.93"/><cell lat="1.0" lon="2.0"/></rsp>"#;
    assert_eq!(parse_lookup_response(body), Some((60.17, 24.93)));
}

#[test]
fn parse_response_without_cell_element() {
    assert_eq!(parse_lookup_response("<rsp stat=\"fail\"/>"), None);
}

#[test]
fn parse_response_with_missing_attributes() {
    assert_eq!(parse_lookup_response(r#"<rsp><cell lat="60.17"/></rsp>"#), None);
}

#[test]
fn parse_response_with_unparsable_coordinates() {
    let body = r#"<rsp><cell lat="north" lon="24.93"/></rsp>"#;
    assert_eq!(parse_lookup_response(body), None);
}

#[test]
fn parse_malformed_document() {
    assert_eq!(parse_lookup_response("not xml at all"), None);
}
