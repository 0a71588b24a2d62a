use fnv::FnvHashMap;
use nom::Slice;

use super::{
    indirect::object_header,
    object::{is_regular, is_whitespace},
    span,
};
use crate::pdf::Reference;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScannedObject {
    pub reference: Reference,
    pub offset: usize,
}

fn skip_back(buf: &[u8], mut pos: usize, f: impl Fn(u8) -> bool) -> usize {
    while pos > 0 && f(buf[pos - 1]) {
        pos -= 1;
    }
    pos
}

/// Start of a `N G obj` header that ends right before `obj_pos`.
fn header_start(buf: &[u8], obj_pos: usize) -> Option<usize> {
    let gen_end = skip_back(buf, obj_pos, is_whitespace);
    let gen_start = skip_back(buf, gen_end, |c| c.is_ascii_digit());
    let num_end = skip_back(buf, gen_start, is_whitespace);
    let num_start = skip_back(buf, num_end, |c| c.is_ascii_digit());
    if gen_start == gen_end || num_end == gen_start || num_start == num_end {
        return None;
    }
    match num_start.checked_sub(1).map(|p| buf[p]) {
        Some(c) if is_regular(c) => None,
        _ => Some(num_start),
    }
}

/// Find every `N G obj` header in `buf`. When an object number is defined
/// more than once the last definition wins.
pub(crate) fn scan_objects(buf: &[u8]) -> Vec<ScannedObject> {
    let file = span(buf);
    let mut found = FnvHashMap::<u32, ScannedObject>::default();

    let mut pos = 0;
    while let Some(found_at) = buf[pos..].windows(3).position(|w| w == b"obj") {
        let obj_pos = pos + found_at;
        pos = obj_pos + 3;
        if buf.get(pos).map_or(false, |&c| is_regular(c)) {
            continue;
        }
        let start = match header_start(buf, obj_pos) {
            Some(start) => start,
            None => continue,
        };
        if let Ok((_, reference)) = object_header(file.slice(start..)) {
            log::trace!("Found object {} at byte {}", reference, start);
            found.insert(reference.number, ScannedObject { reference, offset: start });
        }
    }

    let mut objects: Vec<_> = found.into_values().collect();
    objects.sort_unstable_by_key(|o| o.reference.number);
    objects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_headers() {
        let buf = b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\n 2 0 obj 5 endobj\n10 3 obj\n(x)\nendobj\nbadobj 4 0 objx\n";
        let objects = scan_objects(buf);
        assert_eq!(
            objects,
            vec![
                ScannedObject {
                    reference: Reference::new(1, 0),
                    offset: 9
                },
                ScannedObject {
                    reference: Reference::new(2, 0),
                    offset: 30
                },
                ScannedObject {
                    reference: Reference::new(10, 3),
                    offset: 47
                },
            ]
        );
    }

    #[test]
    fn last_definition_wins() {
        let buf = b"1 0 obj 1 endobj\n1 1 obj 2 endobj\n";
        assert_eq!(
            scan_objects(buf),
            vec![ScannedObject {
                reference: Reference::new(1, 1),
                offset: 17
            }]
        );
    }
}
