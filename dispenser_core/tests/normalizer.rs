use dispenser_core::command::{ChannelKeys, PayloadSchema, parse_wash_request};
use dispenser_core::{CommandId, CommandKind, ValidationError};
use rstest::rstest;
use std::time::Duration;

fn schema() -> PayloadSchema {
    PayloadSchema::new(
        "commandId",
        vec![
            ChannelKeys::new("zinc"),
            ChannelKeys::new("melatonin"),
            ChannelKeys::new("magnesium").alias("magnesum"),
            ChannelKeys::new("electrolyte"),
        ],
    )
}

#[test]
fn absent_channels_default_to_zero() {
    let cmd = schema().normalize(br#"{"commandId":"a","zinc":2}"#).unwrap();
    assert_eq!(cmd.id, CommandId::new("a"));
    assert_eq!(cmd.kind, CommandKind::Dispense);
    assert_eq!(cmd.amounts.get("zinc"), 2.0);
    assert_eq!(cmd.amounts.get("melatonin"), 0.0);
    assert_eq!(cmd.amounts.get("electrolyte"), 0.0);
    assert_eq!(cmd.amounts.iter().count(), 4);
}

#[rstest]
#[case(r#"{"commandId":"a","zinc":3}"#, 3.0)]
#[case(r#"{"commandId":"a","zinc":2.5}"#, 2.5)]
#[case(r#"{"commandId":"a","zinc":"4"}"#, 4.0)]
#[case(r#"{"commandId":"a","zinc":" 1.25 "}"#, 1.25)]
#[case(r#"{"commandId":"a","zinc":"abc"}"#, 0.0)]
#[case(r#"{"commandId":"a","zinc":-3}"#, 0.0)]
#[case(r#"{"commandId":"a","zinc":true}"#, 0.0)]
#[case(r#"{"commandId":"a","zinc":[1]}"#, 0.0)]
#[case(r#"{"commandId":"a","zinc":null}"#, 0.0)]
fn amounts_coerce_leniently(#[case] body: &str, #[case] expected: f64) {
    let cmd = schema().normalize(body.as_bytes()).unwrap();
    assert_eq!(cmd.amounts.get("zinc"), expected);
}

#[rstest]
#[case(r#"{"commandId":"a","magnesium":1,"magnesum":9}"#, 1.0)]
#[case(r#"{"commandId":"a","magnesum":9}"#, 9.0)]
#[case(r#"{"commandId":"a","magnesium":null,"magnesum":9}"#, 9.0)]
fn canonical_key_wins_over_alias(#[case] body: &str, #[case] expected: f64) {
    let cmd = schema().normalize(body.as_bytes()).unwrap();
    assert_eq!(cmd.amounts.get("magnesium"), expected);
}

#[rstest]
#[case(r#"{"zinc":5}"#)]
#[case(r#"{"commandId":null,"zinc":5}"#)]
#[case(r#"{"commandId":"","zinc":5}"#)]
#[case(r#"{"commandId":"   "}"#)]
#[case(r#"{"commandId":{"nested":1}}"#)]
#[case(r#"{"commandUuid":"x"}"#)]
fn missing_or_unusable_id_is_rejected(#[case] body: &str) {
    assert_eq!(
        schema().normalize(body.as_bytes()),
        Err(ValidationError::MissingCommandId("commandId".into()))
    );
}

#[test]
fn numeric_id_is_kept_as_text() {
    let cmd = schema().normalize(br#"{"commandId":42}"#).unwrap();
    assert_eq!(cmd.id.as_str(), "42");
}

#[test]
fn undecodable_and_non_object_bodies() {
    assert!(matches!(
        schema().normalize(b"{oops"),
        Err(ValidationError::Decode(_))
    ));
    assert_eq!(
        schema().normalize(b"[1,2,3]"),
        Err(ValidationError::NotAnObject)
    );
}

#[test]
fn unknown_fields_are_ignored() {
    let cmd = schema()
        .normalize(br#"{"commandId":"a","vitamin":7,"zinc":1}"#)
        .unwrap();
    assert_eq!(cmd.amounts.get("vitamin"), 0.0);
    assert_eq!(cmd.amounts.total(), 1.0);
}

#[test]
fn wash_fields_on_command_body() {
    let cmd = schema()
        .normalize(br#"{"commandId":"w","kind":"Wash","slot":"2","washSec":0.5}"#)
        .unwrap();
    assert_eq!(cmd.kind, CommandKind::Wash);
    assert_eq!(cmd.slot, Some(2));
    assert_eq!(cmd.wash_duration, Some(Duration::from_millis(500)));
}

#[test]
fn alternate_command_id_key() {
    let s = PayloadSchema::new("commandUuid", vec![ChannelKeys::new("zinc")]);
    let cmd = s.normalize(br#"{"commandUuid":"u","zinc":1}"#).unwrap();
    assert_eq!(cmd.id.as_str(), "u");
    assert_eq!(s.command_id_key(), "commandUuid");
}

#[rstest]
#[case(r#"{"slot":3}"#, Ok((3, None)))]
#[case(r#"{"slot":3.0,"washSeconds":2}"#, Ok((3, Some(2000))))]
#[case(r#"{"slot":3,"washSeconds":0}"#, Ok((3, None)))]
#[case(r#"{"slot":3,"washSeconds":"x"}"#, Ok((3, None)))]
#[case(r#"{"slot":null}"#, Err(ValidationError::InvalidSlot))]
#[case(r#"{"slot":"2a"}"#, Err(ValidationError::InvalidSlot))]
#[case(r#""slot""#, Err(ValidationError::NotAnObject))]
fn wash_request_parsing(
    #[case] body: &str,
    #[case] expected: Result<(i64, Option<u64>), ValidationError>,
) {
    let got = parse_wash_request(body.as_bytes())
        .map(|r| (r.slot, r.duration.map(|d| d.as_millis() as u64)));
    assert_eq!(got, expected);
}
