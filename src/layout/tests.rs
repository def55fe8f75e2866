use std::collections::BTreeSet;

use super::tokens::{RawToken, parse_bbox_layout, prepare_token_stream};
use super::*;

fn line(page_index: usize, x0: f64, y1: f64, height: f64, text: &str) -> PositionedLine {
    PositionedLine::new(page_index, x0, y1 - height, x0 + 200.0, y1, text)
}

fn experience_refs(lines: &[PositionedLine]) -> Vec<&PositionedLine> {
    lines.iter().collect()
}

fn parser() -> LayoutParser {
    LayoutParser::new(LayoutConfig::default()).expect("default layout config is valid")
}

fn sample_profile() -> Vec<PositionedLine> {
    vec![
        line(0, 30.0, 760.0, 18.0, "Contact"),
        line(0, 30.0, 740.0, 15.0, "+90 555 123 4567 (Mobile)"),
        line(0, 30.0, 725.0, 15.0, "jane.doe@example.com"),
        line(0, 30.0, 710.0, 15.0, "www.linkedin.com/in/jane-"),
        line(0, 30.0, 695.0, 15.0, "doe-1a2b3c (LinkedIn)"),
        line(0, 30.0, 660.0, 18.0, "Top Skills"),
        line(0, 30.0, 640.0, 15.0, "Rust"),
        line(0, 220.0, 770.0, 26.0, "Jane Doe"),
        line(0, 220.0, 740.0, 15.0, "Backend engineer"),
        line(0, 220.0, 700.0, 22.0, "Experience"),
        line(0, 220.0, 680.0, 17.0, "Acme Corp"),
        line(0, 220.0, 660.0, 16.0, "Senior Software Engineer"),
        line(
            0,
            220.0,
            645.0,
            15.0,
            "June 2019 - August 2021 (2 years 3 months)",
        ),
        line(0, 220.0, 630.0, 15.0, "Istanbul, Turkey"),
        line(1, 220.0, 760.0, 17.0, "Globex"),
        line(1, 220.0, 740.0, 16.0, "Software Engineer"),
        line(
            1,
            220.0,
            725.0,
            15.0,
            "March 2015 - May 2019 (4 years 3 months)",
        ),
        line(1, 220.0, 690.0, 22.0, "Education"),
        line(1, 220.0, 670.0, 17.0, "State University"),
        line(1, 220.0, 650.0, 15.0, "September 2010 - June 2014"),
    ]
}

#[test]
fn prepare_token_stream_drops_blank_lines_and_orders_by_page_then_top() {
    let lines = vec![
        line(1, 10.0, 700.0, 15.0, "page two"),
        line(0, 10.0, 500.0, 15.0, "lower"),
        line(0, 10.0, 650.0, 15.0, "   "),
        line(0, 10.0, 700.0, 15.0, "upper"),
    ];

    let prepared = prepare_token_stream(lines);
    let texts = prepared
        .iter()
        .map(|line| line.text.as_str())
        .collect::<Vec<&str>>();
    assert_eq!(texts, vec!["upper", "lower", "page two"]);
}

#[test]
fn normalized_coordinates_follow_reading_order_across_pages() {
    let lines = vec![
        line(0, 10.0, 780.0, 15.0, "p0 top"),
        line(0, 10.0, 100.0, 15.0, "p0 bottom"),
        line(1, 10.0, 770.0, 15.0, "p1 top"),
        line(1, 10.0, 90.0, 15.0, "p1 bottom"),
        line(2, 10.0, 760.0, 15.0, "p2 top"),
    ];

    let normalized = normalize_page_coordinates(&lines);

    let mut by_y = normalized.clone();
    by_y.sort_by(|left, right| right.y1.total_cmp(&left.y1));
    let texts = by_y
        .iter()
        .map(|line| line.text.as_str())
        .collect::<Vec<&str>>();
    assert_eq!(
        texts,
        vec!["p0 top", "p0 bottom", "p1 top", "p1 bottom", "p2 top"]
    );

    // Page 0 is lifted by the maxima of pages 1 and 2; the last page stays put.
    assert_eq!(normalized[0].y1, 780.0 + 770.0 + 760.0);
    assert_eq!(normalized[0].y0, 765.0 + 755.0 + 745.0);
    assert_eq!(normalized[4].y1, 760.0);
}

#[test]
fn normalization_preserves_line_height() {
    let lines = vec![
        line(0, 10.0, 780.0, 17.0, "company"),
        line(1, 10.0, 700.0, 15.0, "detail"),
    ];

    let normalized = normalize_page_coordinates(&lines);
    assert_eq!(normalized[0].rounded_height(), 17);
    assert_eq!(normalized[1].rounded_height(), 15);
}

#[test]
fn classify_indentation_ranks_bands_by_x0() {
    let lines = vec![
        line(0, 220.0, 700.0, 15.0, "body"),
        line(0, 30.0, 690.0, 15.0, "sidebar"),
        line(0, 220.1, 680.0, 15.0, "body within tolerance"),
        line(0, 400.0, 670.0, 15.0, "far right"),
        line(0, 30.0, 660.0, 15.0, "sidebar again"),
    ];

    let classification = classify_indentation(&lines, 0.001);
    assert_eq!(classification.bands.len(), 3);
    assert_eq!(classification.band_of_line, vec![1, 0, 1, 2, 0]);
    assert_eq!(classification.bands[0].anchor_x0, 30.0);
    assert_eq!(classification.members(1), &[0, 2]);
    assert!(classification.members(9).is_empty());
}

#[test]
fn classify_indentation_splits_beyond_tolerance() {
    let lines = vec![
        line(0, 100.0, 700.0, 15.0, "anchor"),
        line(0, 100.5, 690.0, 15.0, "outside 0.1 percent"),
    ];

    let classification = classify_indentation(&lines, 0.001);
    assert_eq!(classification.bands.len(), 2);

    let loose = classify_indentation(&lines, 0.01);
    assert_eq!(loose.bands.len(), 1);
}

#[test]
fn classify_indentation_partition_is_independent_of_input_order() {
    let lines = sample_profile();
    let mut reversed = lines.clone();
    reversed.reverse();

    let partition = |lines: &[PositionedLine]| {
        let classification = classify_indentation(lines, 0.001);
        classification
            .bands
            .iter()
            .map(|band| {
                band.members
                    .iter()
                    .map(|&index| lines[index].text.clone())
                    .collect::<BTreeSet<String>>()
            })
            .collect::<BTreeSet<BTreeSet<String>>>()
    };

    assert_eq!(partition(&lines), partition(&reversed));
}

#[test]
fn every_line_belongs_to_exactly_one_band() {
    let lines = sample_profile();
    let classification = classify_indentation(&lines, 0.001);

    let mut seen = classification
        .bands
        .iter()
        .flat_map(|band| band.members.iter().copied())
        .collect::<Vec<usize>>();
    seen.sort_unstable();
    assert_eq!(seen, (0..lines.len()).collect::<Vec<usize>>());
}

#[test]
fn assign_section_titles_carries_running_title() {
    let lines = vec![
        line(0, 220.0, 790.0, 15.0, "preamble"),
        line(0, 220.0, 770.0, 22.0, "Summary"),
        line(0, 220.0, 750.0, 15.0, "summary text"),
        line(0, 220.0, 730.0, 22.0, "Experience"),
        line(0, 220.0, 710.0, 17.0, "Acme"),
    ];
    let members = (0..lines.len()).collect::<Vec<usize>>();

    let titled = assign_section_titles(&lines, &members, 22);
    let titles = titled
        .iter()
        .map(|entry| entry.title)
        .collect::<Vec<Option<&str>>>();
    assert_eq!(
        titles,
        vec![
            None,
            Some("Summary"),
            Some("Summary"),
            Some("Experience"),
            Some("Experience")
        ]
    );

    let experience = section_lines(&titled, "Experience");
    assert_eq!(experience.len(), 2);
    assert_eq!(first_title_line(&titled, 22), Some("Summary"));
}

#[test]
fn date_range_parser_reads_closed_and_open_ranges() {
    let parser = DateRangeParser::new().expect("regex compiles");

    let closed = parser.find_all("June 2019 - August 2021 (2 years 3 months)");
    assert_eq!(
        closed,
        vec![DateRange {
            start: "June 2019".to_string(),
            end: Some("August 2021".to_string()),
            trailing_status: None,
        }]
    );

    let open = parser.find_all("January 2020 - Present (4 years 10 months)");
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].end, None);
    assert_eq!(open[0].trailing_status.as_deref(), Some("Present"));
    assert_eq!(open[0].end_label(), "Present");

    let en_dash = parser.find_all("march 2015 – may 2019");
    assert_eq!(en_dash[0].end.as_deref(), Some("may 2019"));

    assert!(parser.find_all("Istanbul, Turkey").is_empty());
}

#[test]
fn date_range_parser_finds_multiple_ranges_in_one_line() {
    let parser = DateRangeParser::new().expect("regex compiles");
    let ranges = parser.find_all("May 2010 - June 2011 and July 2012 - August 2013");
    assert_eq!(ranges.len(), 2);
    assert_eq!(ranges[1].start, "July 2012");
}

#[test]
fn experience_state_machine_nests_positions_and_periods() {
    let parser = DateRangeParser::new().expect("regex compiles");
    let lines = vec![
        line(0, 220.0, 700.0, 17.0, "Acme Corp"),
        line(0, 220.0, 680.0, 16.0, "Engineer"),
        line(0, 220.0, 660.0, 15.0, "January 2018 - December 2018"),
        line(0, 220.0, 640.0, 15.0, "March 2019 - June 2019"),
        line(0, 220.0, 620.0, 16.0, "Lead Engineer"),
        line(0, 220.0, 600.0, 15.0, "July 2019 - Present"),
    ];

    let extraction = extract_experience(
        &experience_refs(&lines),
        &LayoutConfig::default(),
        &parser,
    );

    assert!(extraction.skipped.is_empty());
    assert_eq!(extraction.records.len(), 1);
    let company = &extraction.records[0];
    assert_eq!(company.company, "Acme Corp");
    assert_eq!(company.positions.len(), 2);
    assert_eq!(company.positions[0].date_periods.len(), 2);
    assert_eq!(company.positions[0].date_periods[0].start, "January 2018");
    assert_eq!(company.positions[0].date_periods[1].start, "March 2019");
    assert_eq!(company.positions[1].position, "Lead Engineer");
    assert_eq!(company.positions[1].date_periods.len(), 1);
}

#[test]
fn experience_detail_lines_without_dates_become_meta() {
    let parser = DateRangeParser::new().expect("regex compiles");
    let lines = vec![
        line(0, 220.0, 700.0, 17.0, "Acme Corp"),
        line(0, 220.0, 680.0, 16.0, "Engineer"),
        line(0, 220.0, 660.0, 15.0, "Istanbul, Turkey"),
        line(0, 220.0, 640.0, 12.0, "Page 1 of 3"),
        line(0, 220.0, 620.0, 15.0, "Built the billing platform"),
    ];

    let extraction = extract_experience(
        &experience_refs(&lines),
        &LayoutConfig::default(),
        &parser,
    );

    let position = &extraction.records[0].positions[0];
    assert_eq!(position.meta, "Istanbul, Turkey Built the billing platform");
    assert!(position.date_periods.is_empty());
}

#[test]
fn experience_lines_before_their_parent_are_skipped_and_reported() {
    let parser = DateRangeParser::new().expect("regex compiles");
    let lines = vec![
        line(0, 220.0, 720.0, 16.0, "Orphan Position"),
        line(0, 220.0, 700.0, 15.0, "June 2010 - June 2011"),
        line(0, 220.0, 690.0, 17.0, "Acme Corp"),
        line(0, 220.0, 680.0, 15.0, "detail before any position"),
        line(0, 220.0, 660.0, 16.0, "Engineer"),
        line(0, 220.0, 640.0, 15.0, "June 2012 - June 2013"),
    ];

    let extraction = extract_experience(
        &experience_refs(&lines),
        &LayoutConfig::default(),
        &parser,
    );

    assert_eq!(extraction.skipped.len(), 3);
    assert!(matches!(
        extraction.skipped[0],
        MalformedLayoutError::PositionWithoutCompany { .. }
    ));
    assert!(matches!(
        extraction.skipped[1],
        MalformedLayoutError::DetailWithoutPosition { .. }
    ));
    assert!(matches!(
        extraction.skipped[2],
        MalformedLayoutError::DetailWithoutPosition { .. }
    ));
    assert_eq!(extraction.records.len(), 1);
    assert_eq!(extraction.records[0].positions.len(), 1);
    assert_eq!(extraction.records[0].positions[0].date_periods.len(), 1);
}

#[test]
fn new_company_does_not_inherit_previous_position() {
    let parser = DateRangeParser::new().expect("regex compiles");
    let lines = vec![
        line(0, 220.0, 720.0, 17.0, "Acme Corp"),
        line(0, 220.0, 700.0, 16.0, "Engineer"),
        line(0, 220.0, 690.0, 17.0, "Globex"),
        line(0, 220.0, 680.0, 15.0, "June 2012 - June 2013"),
    ];

    let extraction = extract_experience(
        &experience_refs(&lines),
        &LayoutConfig::default(),
        &parser,
    );

    assert_eq!(extraction.records.len(), 2);
    assert!(extraction.records[0].positions[0].date_periods.is_empty());
    assert!(extraction.records[1].positions.is_empty());
    assert_eq!(extraction.skipped.len(), 1);
}

#[test]
fn contact_records_start_on_title_height() {
    let lines = vec![
        line(0, 30.0, 740.0, 15.0, "stray line"),
        line(0, 30.0, 720.0, 18.0, "Contact"),
        line(0, 30.0, 700.0, 15.0, "first"),
        line(0, 30.0, 680.0, 15.0, "second"),
    ];
    let refs = lines.iter().collect::<Vec<&PositionedLine>>();

    let extraction = extract_contact_records(&refs, &LayoutConfig::default());
    assert_eq!(extraction.records.len(), 1);
    assert_eq!(extraction.records[0].contact_lines, vec!["first", "second"]);
    assert_eq!(extraction.skipped.len(), 1);
}

#[test]
fn derive_contact_fields_reads_email_phone_and_wrapped_linkedin() {
    let record = ContactRecord {
        contact_lines: vec![
            "(Mobile) call me".to_string(),
            "+1 (555) 010-9999 (Mobile)".to_string(),
            "jane@example.com".to_string(),
            "www.linkedin.com/in/jane-".to_string(),
            "doe-".to_string(),
            "42 (LinkedIn)".to_string(),
        ],
    };

    let fields = derive_contact_fields(Some("Jane Doe"), &[record]);
    assert_eq!(fields.name.as_deref(), Some("Jane Doe"));
    assert_eq!(fields.email.as_deref(), Some("jane@example.com"));
    assert_eq!(fields.phone.as_deref(), Some("+1"));
    assert_eq!(
        fields.linkedin.as_deref(),
        Some("www.linkedin.com/in/jane-doe-42")
    );
}

#[test]
fn derive_contact_fields_falls_back_to_first_contact_line_for_name() {
    let record = ContactRecord {
        contact_lines: vec!["Jane Doe".to_string(), "jane@example.org".to_string()],
    };

    let fields = derive_contact_fields(None, &[record]);
    assert_eq!(fields.name.as_deref(), Some("Jane Doe"));
    assert_eq!(fields.email, None);
    assert_eq!(fields.phone, None);
    assert_eq!(fields.linkedin, None);

    let empty = derive_contact_fields(None, &[]);
    assert_eq!(empty, ContactFields::default());
}

#[test]
fn segment_builds_contact_and_experience_from_profile_layout() {
    let resume = parser().segment(&sample_profile());

    assert_eq!(resume.line_count, 20);
    assert_eq!(resume.bands.len(), 2);
    assert_eq!(resume.contact.name.as_deref(), Some("Jane Doe"));
    assert_eq!(resume.contact.email.as_deref(), Some("jane.doe@example.com"));
    assert_eq!(resume.contact.phone.as_deref(), Some("+90 555 123 4567"));
    assert_eq!(
        resume.contact.linkedin.as_deref(),
        Some("www.linkedin.com/in/jane-doe-1a2b3c")
    );
    assert_eq!(resume.contact_records.len(), 1);
    assert_eq!(resume.contact_records[0].contact_lines.len(), 4);

    let companies = resume
        .experience
        .iter()
        .map(|entry| entry.company.as_str())
        .collect::<Vec<&str>>();
    assert_eq!(companies, vec!["Acme Corp", "Globex"]);
    assert_eq!(resume.experience[0].positions[0].meta, "Istanbul, Turkey");
    assert_eq!(
        resume.experience[1].positions[0].date_periods[0].end.as_deref(),
        Some("May 2019")
    );
    assert!(resume.skipped_lines.is_empty());
    assert_eq!(
        resume.position_titles(),
        vec!["Senior Software Engineer", "Software Engineer"]
    );
}

#[test]
fn segment_honors_custom_thresholds() {
    let config = LayoutConfig {
        company_height: 12,
        position_height: 11,
        detail_height: 10,
        ..LayoutConfig::default()
    };
    let parser = LayoutParser::new(config).expect("config is valid");
    let lines = vec![
        line(0, 30.0, 760.0, 18.0, "Contact"),
        line(0, 220.0, 700.0, 22.0, "Experience"),
        line(0, 220.0, 680.0, 12.0, "Initech"),
        line(0, 220.0, 660.0, 11.0, "Analyst"),
        line(0, 220.0, 640.0, 10.0, "June 2001 - June 2003"),
    ];

    let resume = parser.segment(&lines);
    assert_eq!(resume.experience.len(), 1);
    assert_eq!(resume.experience[0].positions[0].position, "Analyst");
}

#[test]
fn layout_config_rejects_colliding_heights() {
    let config = LayoutConfig {
        position_height: 17,
        ..LayoutConfig::default()
    };
    assert!(LayoutParser::new(config).is_err());
}

#[test]
fn layout_config_fills_missing_fields_with_defaults() {
    let config: LayoutConfig =
        serde_json::from_str(r#"{"company_height": 14}"#).expect("partial config parses");
    assert_eq!(config.company_height, 14);
    assert_eq!(config.primary_title_height, 22);
    assert_eq!(config.experience_title, "Experience");
}

#[test]
fn parse_bbox_layout_flips_y_and_joins_words() {
    let xhtml = r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<body>
<doc>
  <page width="612.000000" height="792.000000">
    <flow>
      <block xMin="30.000000" yMin="40.000000" xMax="200.000000" yMax="60.000000">
        <line xMin="30.000000" yMin="40.000000" xMax="120.000000" yMax="58.000000">
          <word xMin="30.000000" yMin="40.000000" xMax="80.000000" yMax="58.000000">Smith</word>
          <word xMin="82.000000" yMin="40.000000" xMax="120.000000" yMax="58.000000">&amp; Co</word>
        </line>
      </block>
    </flow>
  </page>
  <page width="612.000000" height="792.000000">
    <flow>
      <block xMin="220.000000" yMin="100.000000" xMax="400.000000" yMax="115.000000">
        <line xMin="220.000000" yMin="100.000000" xMax="400.000000" yMax="115.000000">
          <word xMin="220.000000" yMin="100.000000" xMax="400.000000" yMax="115.000000">Engineer</word>
        </line>
      </block>
    </flow>
  </page>
</doc>
</body>
</html>"#;

    let lines = parse_bbox_layout(xhtml).expect("bbox layout parses");
    assert_eq!(lines.len(), 2);

    assert_eq!(lines[0].page_index, 0);
    assert_eq!(lines[0].text, "Smith & Co");
    assert_eq!(lines[0].x0, 30.0);
    assert_eq!(lines[0].y0, 792.0 - 58.0);
    assert_eq!(lines[0].y1, 792.0 - 40.0);
    assert_eq!(lines[0].rounded_height(), 18);

    assert_eq!(lines[1].page_index, 1);
    assert_eq!(lines[1].text, "Engineer");
    assert_eq!(lines[1].rounded_height(), 15);
}

#[test]
fn parse_bbox_layout_decodes_character_references_in_any_attribute_order() {
    let xhtml = r#"<doc>
  <page height="800" width="600">
    <flow>
      <block xMin="10" yMin="10" xMax="300" yMax="30">
        <line yMax="30" xMax="300" yMin="14" xMin="10">
          <word xMin="10" yMin="14" xMax="60" yMax="30">Caf&#233;</word>
          <word xMin="62" yMin="14" xMax="120" yMax="30">R&amp;D</word>
          <word xMin="122" yMin="14" xMax="180" yMax="30">&#x2013;</word>
          <word xMin="182" yMin="14" xMax="300" yMax="30">&lt;Lead&gt;</word>
        </line>
      </block>
    </flow>
  </page>
</doc>"#;

    let lines = parse_bbox_layout(xhtml).expect("bbox layout parses");

    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].text, "Café R&D – <Lead>");
    assert_eq!(lines[0].x0, 10.0);
    assert_eq!(lines[0].y0, 770.0);
    assert_eq!(lines[0].y1, 786.0);
}

#[test]
fn parse_bbox_layout_rejects_line_without_coordinates() {
    let xhtml = r#"<doc><page height="800"><line xMin="10" yMin="14"><word>Orphan</word></line></page></doc>"#;

    let error = parse_bbox_layout(xhtml).expect_err("missing xMax should fail");
    assert!(error.to_string().contains("xMax"));
}

#[test]
fn rounded_height_breaks_half_point_ties_to_even() {
    let lower = PositionedLine::new(0, 30.0, 700.0, 200.0, 716.5, "Position");
    let upper = PositionedLine::new(0, 30.0, 700.0, 200.0, 717.5, "Company");

    assert_eq!(lower.rounded_height(), 16);
    assert_eq!(upper.rounded_height(), 18);
}

#[test]
fn raw_tokens_deserialize_into_positioned_lines() {
    let raw = r#"[{"page_index": 0, "x0": 30.0, "y0": 700.0, "x1": 90.0, "y1": 717.2, "text": "  Acme   Corp "}]"#;
    let tokens: Vec<RawToken> = serde_json::from_str(raw).expect("token json parses");
    let lines = tokens
        .into_iter()
        .map(PositionedLine::from)
        .collect::<Vec<PositionedLine>>();

    assert_eq!(lines[0].text, "Acme Corp");
    assert_eq!(lines[0].rounded_height(), 17);
}
