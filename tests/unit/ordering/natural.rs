use super::*;

fn sorted(names: &[&str]) -> Vec<String> {
    let mut v: Vec<PathBuf> = names.iter().map(PathBuf::from).collect();
    sort_natural(&mut v);
    v.into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect()
}

#[test]
fn numbers_compare_numerically() {
    assert_eq!(
        sorted(&["img10.jpg", "img2.jpg", "img1.jpg"]),
        vec!["img1.jpg", "img2.jpg", "img10.jpg"]
    );
}

#[test]
fn text_compares_case_insensitively() {
    assert_eq!(natural_cmp("Beta", "alpha"), Ordering::Greater);
    assert_eq!(
        sorted(&["b.png", "A.png", "c.png"]),
        vec!["A.png", "b.png", "c.png"]
    );
}

#[test]
fn digit_run_sorts_before_text_run() {
    assert_eq!(natural_cmp("1cat", "cat"), Ordering::Less);
    assert_eq!(natural_cmp("page_x", "page_1"), Ordering::Greater);
}

#[test]
fn shorter_key_sorts_first() {
    assert_eq!(natural_cmp("img", "img1"), Ordering::Less);
    assert_eq!(natural_cmp("img1", "img1a"), Ordering::Less);
}

#[test]
fn equal_keys_fall_back_to_bytes() {
    assert_ne!(natural_cmp("a01", "a1"), Ordering::Equal);
    assert_ne!(natural_cmp("A", "a"), Ordering::Equal);
    assert_eq!(natural_cmp("same", "same"), Ordering::Equal);
}

#[test]
fn long_digit_runs_do_not_overflow() {
    let a = "shot_99999999999999999999999999.png";
    let b = "shot_100000000000000000000000000.png";
    assert_eq!(natural_cmp(a, b), Ordering::Less);
}

#[test]
fn order_is_total_and_idempotent() {
    let names = [
        "x10", "x9", "X9", "x09", "x", "10", "9", "a1b2", "a1b10", "a01b2", "_", "Z", "z1", "1z",
        "x10y", "x10Y",
    ];
    let once = sorted(&names);
    let twice = sorted(&once.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(once, twice);

    for a in names {
        for b in names {
            let ab = natural_cmp(a, b);
            assert_eq!(ab, natural_cmp(b, a).reverse(), "antisymmetry {a} {b}");
            assert_eq!(ab == Ordering::Equal, a == b, "strictness {a} {b}");
            for c in names {
                if ab == Ordering::Less && natural_cmp(b, c) == Ordering::Less {
                    assert_eq!(natural_cmp(a, c), Ordering::Less, "transitivity {a} {b} {c}");
                }
            }
        }
    }
}

#[test]
fn directories_are_ordered_naturally_too() {
    assert_eq!(
        sorted(&["set10/1.jpg", "set2/5.jpg", "set2/10.jpg"]),
        vec!["set2/5.jpg", "set2/10.jpg", "set10/1.jpg"]
    );
}
