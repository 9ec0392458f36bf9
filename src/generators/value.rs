//! Value template engine.
//!
//! A template is a JSON document whose string leaves may be directives such
//! as `"int:1..10"` or `"text:50"`. Parsing is eager and validates directive
//! syntax; rendering resolves every directive independently so two renders of
//! the same template produce uncorrelated values.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use crate::error::BenchError;

/// A parsed directive found in a string leaf.
#[derive(Clone, Debug, PartialEq)]
pub enum Directive {
    /// `int`: uniform random 32-bit integer.
    Int,
    /// `int:A..B`: uniform integer in `[A, B]`.
    IntRange(i64, i64),
    /// `int:a,b,c`: uniform choice over an integer list.
    IntChoice(Vec<i64>),
    /// `float`: uniform random float in `[0, 1)`.
    Float,
    /// `float:A..B`: uniform float in `[A, B)`.
    FloatRange(f64, f64),
    /// `float:a,b,c`: uniform choice over a float list.
    FloatChoice(Vec<f64>),
    /// `bool`: uniform boolean.
    Bool,
    /// `uuid`: version-4 identifier.
    DirUuid,
    /// `datetime`: current instant, ISO-8601.
    DateTime,
    /// `string:N`: random alphanumeric of length N.
    StringLen(usize),
    /// `string:A..B`: random alphanumeric of length in `[A, B]`.
    StringRange(usize, usize),
    /// `text:N`: space-separated random words totaling N characters.
    TextLen(usize),
    /// `text:A..B`: same, total length in `[A, B]`.
    TextRange(usize, usize),
    /// `enum:a,b,c`: uniform choice from a string list.
    EnumChoice(Vec<String>),
}

/// A parsed template node mirroring the JSON tree shape.
#[derive(Clone, Debug)]
pub enum Node {
    /// A non-directive JSON value, emitted verbatim.
    Literal(Value),
    /// A string leaf recognized as a directive.
    Directive(Directive),
    /// Object rendered element-wise.
    Object(Vec<(String, Node)>),
    /// Array rendered element-wise.
    Array(Vec<Node>),
}

/// A reusable, immutable value template.
#[derive(Clone, Debug)]
pub struct Template {
    root: Node,
}

impl Template {
    /// Parse template text, validating JSON shape and directive syntax.
    pub fn parse(text: &str) -> Result<Template, BenchError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| BenchError::Config(format!("invalid value template JSON: {e}")))?;
        Ok(Template {
            root: parse_node(&value)?,
        })
    }

    /// Render a fresh document; every directive leaf is resolved independently.
    pub fn render<R: Rng>(&self, rng: &mut R) -> Value {
        render_node(&self.root, rng)
    }
}

fn parse_node(value: &Value) -> Result<Node, BenchError> {
    match value {
        Value::Object(map) => {
            let mut fields = Vec::with_capacity(map.len());
            for (key, child) in map {
                fields.push((key.clone(), parse_node(child)?));
            }
            Ok(Node::Object(fields))
        }
        Value::Array(items) => {
            let mut nodes = Vec::with_capacity(items.len());
            for child in items {
                nodes.push(parse_node(child)?);
            }
            Ok(Node::Array(nodes))
        }
        Value::String(text) => match parse_directive(text)? {
            Some(directive) => Ok(Node::Directive(directive)),
            None => Ok(Node::Literal(value.clone())),
        },
        other => Ok(Node::Literal(other.clone())),
    }
}

/// Recognize a directive in a string leaf.
///
/// Returns `Ok(None)` for unrecognized strings, which render verbatim. A
/// payload that parses as a range but is inverted (`A > B`) is a
/// configuration error.
fn parse_directive(text: &str) -> Result<Option<Directive>, BenchError> {
    match text {
        "int" => return Ok(Some(Directive::Int)),
        "float" => return Ok(Some(Directive::Float)),
        "bool" => return Ok(Some(Directive::Bool)),
        "uuid" => return Ok(Some(Directive::DirUuid)),
        "datetime" => return Ok(Some(Directive::DateTime)),
        _ => {}
    }

    if let Some(payload) = text.strip_prefix("int:") {
        if let Some((a, b)) = parse_range::<i64>(payload) {
            check_order(a <= b, text)?;
            return Ok(Some(Directive::IntRange(a, b)));
        }
        if let Some(choices) = parse_list::<i64>(payload) {
            return Ok(Some(Directive::IntChoice(choices)));
        }
        return Ok(None);
    }

    if let Some(payload) = text.strip_prefix("float:") {
        if let Some((a, b)) = parse_range::<f64>(payload) {
            check_order(a <= b, text)?;
            return Ok(Some(Directive::FloatRange(a, b)));
        }
        if let Some(choices) = parse_list::<f64>(payload) {
            return Ok(Some(Directive::FloatChoice(choices)));
        }
        return Ok(None);
    }

    if let Some(payload) = text.strip_prefix("string:") {
        if let Some((a, b)) = parse_range::<usize>(payload) {
            check_order(a <= b, text)?;
            return Ok(Some(Directive::StringRange(a, b)));
        }
        if let Ok(len) = payload.parse::<usize>() {
            return Ok(Some(Directive::StringLen(len)));
        }
        return Ok(None);
    }

    if let Some(payload) = text.strip_prefix("text:") {
        if let Some((a, b)) = parse_range::<usize>(payload) {
            check_order(a <= b, text)?;
            return Ok(Some(Directive::TextRange(a, b)));
        }
        if let Ok(len) = payload.parse::<usize>() {
            return Ok(Some(Directive::TextLen(len)));
        }
        return Ok(None);
    }

    if let Some(payload) = text.strip_prefix("enum:") {
        let choices: Vec<String> = payload.split(',').map(|s| s.to_string()).collect();
        if !choices.is_empty() {
            return Ok(Some(Directive::EnumChoice(choices)));
        }
        return Ok(None);
    }

    Ok(None)
}

fn check_order(ordered: bool, text: &str) -> Result<(), BenchError> {
    if ordered {
        Ok(())
    } else {
        Err(BenchError::Config(format!(
            "inverted range in template directive '{text}'"
        )))
    }
}

fn parse_range<T: std::str::FromStr>(payload: &str) -> Option<(T, T)> {
    let (lo, hi) = payload.split_once("..")?;
    Some((lo.parse().ok()?, hi.parse().ok()?))
}

fn parse_list<T: std::str::FromStr>(payload: &str) -> Option<Vec<T>> {
    if payload.is_empty() {
        return None;
    }
    payload
        .split(',')
        .map(|s| s.trim().parse().ok())
        .collect::<Option<Vec<T>>>()
}

fn render_node<R: Rng>(node: &Node, rng: &mut R) -> Value {
    match node {
        Node::Literal(value) => value.clone(),
        Node::Directive(directive) => render_directive(directive, rng),
        Node::Object(fields) => {
            let mut map = Map::with_capacity(fields.len());
            for (key, child) in fields {
                map.insert(key.clone(), render_node(child, rng));
            }
            Value::Object(map)
        }
        Node::Array(items) => Value::Array(items.iter().map(|n| render_node(n, rng)).collect()),
    }
}

fn render_directive<R: Rng>(directive: &Directive, rng: &mut R) -> Value {
    match directive {
        Directive::Int => Value::from(rng.gen::<i32>()),
        Directive::IntRange(a, b) => Value::from(rng.gen_range(*a..=*b)),
        Directive::IntChoice(choices) => {
            Value::from(choices[rng.gen_range(0..choices.len())])
        }
        Directive::Float => float_value(rng.gen::<f64>()),
        Directive::FloatRange(a, b) => {
            if a == b {
                float_value(*a)
            } else {
                float_value(rng.gen_range(*a..*b))
            }
        }
        Directive::FloatChoice(choices) => {
            float_value(choices[rng.gen_range(0..choices.len())])
        }
        Directive::Bool => Value::from(rng.gen::<bool>()),
        Directive::DirUuid => Value::from(Uuid::new_v4().to_string()),
        Directive::DateTime => Value::from(Utc::now().to_rfc3339()),
        Directive::StringLen(len) => Value::from(random_string(rng, *len)),
        Directive::StringRange(a, b) => {
            let len = rng.gen_range(*a..=*b);
            Value::from(random_string(rng, len))
        }
        Directive::TextLen(len) => Value::from(random_text(rng, *len)),
        Directive::TextRange(a, b) => {
            let len = rng.gen_range(*a..=*b);
            Value::from(random_text(rng, len))
        }
        Directive::EnumChoice(choices) => {
            Value::from(choices[rng.gen_range(0..choices.len())].clone())
        }
    }
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Random string drawn from `[A-Za-z0-9]`.
pub fn random_string<R: Rng>(rng: &mut R, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Space-separated random words with lengths uniform in `[2, 10]`, the final
/// word truncated so the total length is exactly `len`.
pub fn random_text<R: Rng>(rng: &mut R, len: usize) -> String {
    let mut text = String::with_capacity(len);
    while text.len() < len {
        if !text.is_empty() {
            text.push(' ');
        }
        let remaining = len - text.len();
        let mut word_len = rng.gen_range(2..=10usize).min(remaining);
        if remaining - word_len == 1 {
            // Never end a word at the second-to-last position: the final
            // character could only be a dangling separator.
            word_len -= 1;
        }
        text.push_str(&random_string(rng, word_len));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const RUNS: usize = 1000;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn render_leaf(template: &str, rng: &mut StdRng) -> Value {
        let tpl = Template::parse(&format!(r#"{{"v": {template}}}"#)).unwrap();
        tpl.render(rng).get("v").unwrap().clone()
    }

    #[test]
    fn test_int_directive_is_32_bit() {
        let mut rng = rng();
        for _ in 0..RUNS {
            let v = render_leaf(r#""int""#, &mut rng);
            let n = v.as_i64().unwrap();
            assert!(n >= i32::MIN as i64 && n <= i32::MAX as i64);
        }
    }

    #[test]
    fn test_int_range_inclusive() {
        let mut rng = rng();
        let mut seen_lo = false;
        let mut seen_hi = false;
        for _ in 0..RUNS {
            let v = render_leaf(r#""int:1..5""#, &mut rng);
            let n = v.as_i64().unwrap();
            assert!((1..=5).contains(&n));
            seen_lo |= n == 1;
            seen_hi |= n == 5;
        }
        assert!(seen_lo && seen_hi, "inclusive bounds never drawn");
    }

    #[test]
    fn test_int_choice() {
        let mut rng = rng();
        for _ in 0..RUNS {
            let v = render_leaf(r#""int:2,4,8""#, &mut rng);
            assert!([2, 4, 8].contains(&v.as_i64().unwrap()));
        }
    }

    #[test]
    fn test_float_unit_interval() {
        let mut rng = rng();
        for _ in 0..RUNS {
            let v = render_leaf(r#""float""#, &mut rng);
            let f = v.as_f64().unwrap();
            assert!((0.0..1.0).contains(&f));
        }
    }

    #[test]
    fn test_float_range_half_open() {
        let mut rng = rng();
        for _ in 0..RUNS {
            let v = render_leaf(r#""float:1.5..2.5""#, &mut rng);
            let f = v.as_f64().unwrap();
            assert!((1.5..2.5).contains(&f));
        }
    }

    #[test]
    fn test_float_choice() {
        let mut rng = rng();
        for _ in 0..RUNS {
            let v = render_leaf(r#""float:0.5,1.5""#, &mut rng);
            let f = v.as_f64().unwrap();
            assert!(f == 0.5 || f == 1.5);
        }
    }

    #[test]
    fn test_bool_directive() {
        let mut rng = rng();
        let mut seen = [false, false];
        for _ in 0..RUNS {
            let v = render_leaf(r#""bool""#, &mut rng);
            seen[v.as_bool().unwrap() as usize] = true;
        }
        assert!(seen[0] && seen[1]);
    }

    #[test]
    fn test_uuid_directive() {
        let mut rng = rng();
        let v = render_leaf(r#""uuid""#, &mut rng);
        let parsed = Uuid::parse_str(v.as_str().unwrap()).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn test_datetime_directive() {
        let mut rng = rng();
        let v = render_leaf(r#""datetime""#, &mut rng);
        assert!(chrono::DateTime::parse_from_rfc3339(v.as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_string_fixed_length() {
        let mut rng = rng();
        for _ in 0..RUNS {
            let v = render_leaf(r#""string:17""#, &mut rng);
            let s = v.as_str().unwrap();
            assert_eq!(s.len(), 17);
            assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_string_length_range_inclusive() {
        let mut rng = rng();
        for _ in 0..RUNS {
            let v = render_leaf(r#""string:3..6""#, &mut rng);
            assert!((3..=6).contains(&v.as_str().unwrap().len()));
        }
    }

    #[test]
    fn test_text_exact_length_and_words() {
        let mut rng = rng();
        for _ in 0..RUNS {
            let v = render_leaf(r#""text:50""#, &mut rng);
            let s = v.as_str().unwrap();
            assert_eq!(s.len(), 50);
            for word in s.split(' ') {
                assert!(!word.is_empty());
                assert!(word.len() <= 10);
                assert!(word.chars().all(|c| c.is_ascii_alphanumeric()));
            }
        }
    }

    #[test]
    fn test_text_length_range() {
        let mut rng = rng();
        for _ in 0..RUNS {
            let v = render_leaf(r#""text:20..30""#, &mut rng);
            assert!((20..=30).contains(&v.as_str().unwrap().len()));
        }
    }

    #[test]
    fn test_enum_choice() {
        let mut rng = rng();
        for _ in 0..RUNS {
            let v = render_leaf(r#""enum:red,green,blue""#, &mut rng);
            assert!(["red", "green", "blue"].contains(&v.as_str().unwrap()));
        }
    }

    #[test]
    fn test_unrecognized_strings_render_verbatim() {
        let mut rng = rng();
        assert_eq!(render_leaf(r#""hello world""#, &mut rng), "hello world");
        assert_eq!(render_leaf(r#""int:abc""#, &mut rng), "int:abc");
        assert_eq!(render_leaf(r#""string:many""#, &mut rng), "string:many");
    }

    #[test]
    fn test_non_string_leaves_render_verbatim() {
        let tpl = Template::parse(r#"{"n": 7, "f": 1.25, "b": true, "z": null}"#).unwrap();
        let doc = tpl.render(&mut rng());
        assert_eq!(doc.get("n").unwrap(), 7);
        assert_eq!(doc.get("f").unwrap(), 1.25);
        assert_eq!(doc.get("b").unwrap(), true);
        assert!(doc.get("z").unwrap().is_null());
    }

    #[test]
    fn test_containers_render_element_wise() {
        let tpl = Template::parse(
            r#"{"outer": {"inner": "int:1..3"}, "list": ["bool", "enum:a,b", 9]}"#,
        )
        .unwrap();
        let doc = tpl.render(&mut rng());
        let inner = doc["outer"]["inner"].as_i64().unwrap();
        assert!((1..=3).contains(&inner));
        assert!(doc["list"][0].is_boolean());
        assert!(doc["list"][1].is_string());
        assert_eq!(doc["list"][2], 9);
    }

    #[test]
    fn test_two_renders_are_uncorrelated() {
        let tpl = Template::parse(r#"{"s": "string:32"}"#).unwrap();
        let mut rng = rng();
        let a = tpl.render(&mut rng);
        let b = tpl.render(&mut rng);
        assert_ne!(a["s"], b["s"]);
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        assert!(matches!(
            Template::parse("{not json"),
            Err(BenchError::Config(_))
        ));
    }

    #[test]
    fn test_inverted_ranges_are_config_errors() {
        for tpl in [
            r#"{"v": "int:9..1"}"#,
            r#"{"v": "float:2.5..1.5"}"#,
            r#"{"v": "string:6..3"}"#,
            r#"{"v": "text:30..20"}"#,
        ] {
            assert!(
                matches!(Template::parse(tpl), Err(BenchError::Config(_))),
                "expected inverted range rejection for {tpl}"
            );
        }
    }
}
