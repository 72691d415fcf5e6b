use super::*;
use Color as C;

fn mkimage<const W: usize, const H: usize>(data: [[Color; W]; H]) -> Image {
    let data = data
        .into_iter()
        .flat_map(|row| row.into_iter())
        .flat_map(|col| col.0)
        .collect::<Vec<_>>();
    Image::from_rgba8(Resolution::new(W as u32, H as u32), &data)
}

#[test]
fn vstack_places_top_above_bottom() {
    let top = mkimage([[C::RED, C::RED]]);
    let bottom = mkimage([[C::BLUE, C::BLUE], [C::GREEN, C::GREEN]]);

    let stacked = Image::vstack(&top, &bottom);
    assert_eq!(stacked.resolution(), Resolution::new(2, 3));
    assert_eq!(stacked.get(1, 0), C::RED);
    assert_eq!(stacked.get(0, 1), C::BLUE);
    assert_eq!(stacked.get(1, 2), C::GREEN);
}

#[test]
fn vstack_pads_narrower_image() {
    let top = mkimage([[C::RED]]);
    let bottom = mkimage([[C::BLUE, C::BLUE, C::BLUE]]);

    let stacked = Image::vstack(&top, &bottom);
    assert_eq!(stacked.resolution(), Resolution::new(3, 2));
    assert_eq!(stacked.get(0, 0), C::RED);
    assert_eq!(stacked.get(2, 0), C::NULL);
    assert_eq!(stacked.get(2, 1), C::BLUE);
}

#[test]
fn scale_rounds_and_never_collapses() {
    let image = Image::new(640, 480);
    assert_eq!(image.scale(0.5).resolution(), Resolution::new(320, 240));
    assert_eq!(image.scale(0.0001).resolution(), Resolution::new(1, 1));
    assert_eq!(Resolution::new(3, 3).scale(1.5), Resolution::new(5, 5));
}

#[test]
fn resize_to_same_size_is_identity() {
    let image = mkimage([[C::RED, C::GREEN], [C::BLUE, C::WHITE]]);
    assert_eq!(image.resize(image.resolution()), image);
}

#[test]
fn filled_rect_covers_area() {
    let mut image = Image::filled(4, 4, C::BLACK);
    draw::rect(&mut image, 1, 1, 2, 2).color(C::YELLOW).filled();

    assert_eq!(image.get(0, 0), C::BLACK);
    assert_eq!(image.get(1, 1), C::YELLOW);
    assert_eq!(image.get(2, 2), C::YELLOW);
    assert_eq!(image.get(3, 3), C::BLACK);
}

#[test]
fn drawing_outside_the_image_is_clipped() {
    let mut image = Image::filled(2, 2, C::BLACK);
    draw::line(&mut image, -5, 0, 5, 0).color(C::WHITE);

    assert_eq!(image.get(0, 0), C::WHITE);
    assert_eq!(image.get(1, 0), C::WHITE);
    assert_eq!(image.get(0, 1), C::BLACK);
}

#[test]
fn text_size_counts_spacing() {
    let font = &embedded_graphics::mono_font::ascii::FONT_6X10;
    assert_eq!(draw::text_size(font, ""), (0, 10));
    assert_eq!(
        draw::text_size(font, "abc"),
        (18 + 2 * font.character_spacing, 10)
    );
}

#[test]
fn load_rejects_unknown_extension() {
    let err = Image::load("frame.bmp").unwrap_err();
    assert!(err.to_string().contains("frame.bmp"), "{err}");
}
