//! Model-reply parsing and field validation tests.

use reelmark_common::Enrichment;

use crate::enrichment::parse_response;

#[test]
fn labeled_lines_fill_their_fields() {
    let reply = "TITLE: Heat\n\
                 URL: https://gofile.io/d/abc123\n\
                 QUALITY: 1080p Remux\n\
                 TYPE: Movie\n\
                 SUMMARY: A 90s heist classic.";
    let parsed = parse_response(reply, "filmfan");

    assert_eq!(parsed.titles, vec!["Heat"]);
    assert_eq!(parsed.urls, vec!["https://gofile.io/d/abc123"]);
    assert_eq!(parsed.qualities, vec!["1080p Remux"]);
    assert_eq!(parsed.types, vec!["Movie"]);
    assert_eq!(parsed.summary, "A 90s heist classic.");
}

#[test]
fn repeated_labels_append_in_order() {
    let reply = "TITLE: Heat\nTITLE: Ronin\nURL: https://mega.nz/file/abc\nURL: https://gofile.io/d/xyz";
    let parsed = parse_response(reply, "filmfan");

    assert_eq!(parsed.titles, vec!["Heat", "Ronin"]);
    assert_eq!(
        parsed.urls,
        vec!["https://mega.nz/file/abc", "https://gofile.io/d/xyz"]
    );
}

#[test]
fn noise_lines_and_inline_labels_are_ignored() {
    let reply = "Here is what I found:\n\
                 The TITLE: Heat appears in the text\n\
                 title: Zodiac\n\
                 \n\
                 TITLE:   Zodiac  ";
    let parsed = parse_response(reply, "filmfan");

    // only the line-initial uppercase label counts, and values are trimmed
    assert_eq!(parsed.titles, vec!["Zodiac"]);
}

#[test]
fn titles_never_echo_the_author() {
    let parsed = parse_response("TITLE: John Smith\nTITLE: Inception", "John Smith");
    assert_eq!(parsed.titles, vec!["Inception"]);
}

#[test]
fn two_capitalized_words_are_not_automatically_a_person() {
    let parsed = parse_response("TITLE: Breaking Bad", "someone");
    assert_eq!(parsed.titles, vec!["Breaking Bad"]);
}

#[test]
fn common_given_name_pairs_are_rejected_as_titles() {
    let parsed = parse_response("TITLE: John Smith\nTITLE: Martin Scorsese", "someone");
    assert!(parsed.titles.is_empty());
}

#[test]
fn person_shaped_titles_are_rejected() {
    let reply = "TITLE: J. Abrams\nTITLE: Dr Strange\nTITLE: Nolan's Films";
    let parsed = parse_response(reply, "someone");
    assert!(parsed.titles.is_empty());
}

#[test]
fn generic_nouns_and_short_titles_are_rejected() {
    let reply = "TITLE: Movie Collection\nTITLE: My Backup\nTITLE: It";
    let parsed = parse_response(reply, "someone");
    assert!(parsed.titles.is_empty());
}

#[test]
fn none_placeholders_leave_every_field_empty() {
    let reply = "TITLE: none\nURL: none\nQUALITY: none\nTYPE: none\nSUMMARY: none";
    let parsed = parse_response(reply, "someone");
    assert_eq!(parsed, Enrichment::default());
}

#[test]
fn urls_need_a_scheme_or_a_known_host_fragment() {
    let reply = "URL: see my bio for it\n\
                 URL: mega.nz/file/XYZ1234567\n\
                 URL: http://a.b";
    let parsed = parse_response(reply, "someone");

    // the bare mega link qualifies by host fragment; the ten-character
    // http one is below the length floor
    assert_eq!(parsed.urls, vec!["mega.nz/file/XYZ1234567"]);
}

#[test]
fn quality_and_type_need_a_known_token() {
    let reply = "QUALITY: great\nQUALITY: 4K HDR\nTYPE: thing\nTYPE: Documentary series";
    let parsed = parse_response(reply, "someone");

    assert_eq!(parsed.qualities, vec!["4K HDR"]);
    assert_eq!(parsed.types, vec!["Documentary series"]);
}

#[test]
fn summary_keeps_the_last_valid_value() {
    let reply = "SUMMARY: First valid summary line\n\
                 SUMMARY: Second valid summary line\n\
                 SUMMARY: tiny";
    let parsed = parse_response(reply, "someone");
    assert_eq!(parsed.summary, "Second valid summary line");
}
