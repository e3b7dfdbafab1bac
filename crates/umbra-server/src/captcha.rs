//! Numeric CAPTCHA rendering.
//!
//! The protocol only requires a renderer that turns a solution number
//! into a challenge image; how convincing that image is to an OCR
//! pipeline is explicitly out of scope. [`DigitGridRenderer`] draws
//! fixed 5x7 bitmap digits onto a noisy background, which is enough to
//! exercise the handshake end to end and nothing more.

use image::{ImageBuffer, Luma};

/// Renders a numeric solution to a PNG challenge image.
pub trait CaptchaRenderer: Send + Sync {
    fn render(&self, solution: u32) -> Vec<u8>;
}

const DIGIT_W: u32 = 5;
const DIGIT_H: u32 = 7;
const MARGIN: u32 = 4;

/// 5x7 bitmap font for digits 0-9, row-major, MSB-first per row.
const FONT: [[u8; 7]; 10] = [
    [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110], // 0
    [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110], // 1
    [0b01110, 0b10001, 0b00001, 0b00110, 0b01000, 0b10000, 0b11111], // 2
    [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110], // 3
    [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010], // 4
    [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110], // 5
    [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110], // 6
    [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000], // 7
    [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110], // 8
    [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100], // 9
];

/// Draws each digit of the solution as a fixed bitmap glyph over a
/// pseudo-noisy grayscale background, seeded by the solution itself so
/// renders are deterministic and testable.
pub struct DigitGridRenderer;

impl CaptchaRenderer for DigitGridRenderer {
    fn render(&self, solution: u32) -> Vec<u8> {
        let digits: Vec<u32> = solution
            .to_string()
            .chars()
            .map(|c| c.to_digit(10).expect("decimal digit"))
            .collect();

        let width = MARGIN * 2 + digits.len() as u32 * (DIGIT_W + 1);
        let height = MARGIN * 2 + DIGIT_H;

        let mut img: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::new(width, height);
        let mut noise_state = solution.wrapping_mul(2654435761).wrapping_add(1);
        for pixel in img.pixels_mut() {
            noise_state = noise_state.wrapping_mul(1103515245).wrapping_add(12345);
            let shade = 200 + (noise_state >> 24) as u8 % 40;
            *pixel = Luma([shade]);
        }

        for (i, &digit) in digits.iter().enumerate() {
            let glyph = FONT[digit as usize];
            let x0 = MARGIN + i as u32 * (DIGIT_W + 1);
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..DIGIT_W {
                    if bits & (1 << (DIGIT_W - 1 - col)) != 0 {
                        img.put_pixel(x0 + col, MARGIN + row as u32, Luma([0]));
                    }
                }
            }
        }

        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            width,
            height,
            image::ExtendedColorType::L8,
        )
        .expect("encoding a freshly built grayscale buffer never fails");
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_valid_png_signature() {
        let renderer = DigitGridRenderer;
        let png = renderer.render(4242);
        assert_eq!(&png[..8], &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a]);
    }

    #[test]
    fn render_is_deterministic_for_same_solution() {
        let renderer = DigitGridRenderer;
        assert_eq!(renderer.render(1234), renderer.render(1234));
    }

    #[test]
    fn different_solutions_render_different_images() {
        let renderer = DigitGridRenderer;
        assert_ne!(renderer.render(1111), renderer.render(2222));
    }

    #[test]
    fn wider_solutions_produce_wider_images() {
        let renderer = DigitGridRenderer;
        let short = renderer.render(1);
        let long = renderer.render(123456);
        assert!(long.len() >= short.len());
    }
}
