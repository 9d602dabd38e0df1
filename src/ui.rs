//! egui panel for the runtime render settings
//!
//! The panel only edits [`RenderSettings`]; the frame renderer picks the new
//! values up on its next frame.

use crate::config::{
    RenderSettings, OFFSET_FACTOR_RANGE, OFFSET_UNITS_RANGE, SHADOW_RESOLUTION_RANGE,
    SPOT_ANGLE_RANGE,
};
use crate::shadow::ClampMode;

/// Draw the settings widgets; returns whether any value changed
pub fn settings_panel(ui: &mut egui::Ui, settings: &mut RenderSettings) -> bool {
    let mut changed = false;

    ui.heading("Shadow map");
    changed |= ui
        .add(
            egui::Slider::new(&mut settings.shadow_resolution, SHADOW_RESOLUTION_RANGE)
                .logarithmic(true)
                .text("Resolution"),
        )
        .changed();
    ui.horizontal(|ui| {
        ui.label("Clamp");
        changed |= ui.radio_value(&mut settings.clamp_mode, ClampMode::Edge, "Edge").changed();
        changed |= ui.radio_value(&mut settings.clamp_mode, ClampMode::Border, "Border").changed();
    });
    changed |= border_controls(ui, settings);
    changed |= ui.checkbox(&mut settings.hardware_pcf, "Hardware PCF").changed();

    ui.separator();
    changed |= ui.checkbox(&mut settings.polygon_offset, "Polygon offset").changed();
    changed |= offset_controls(ui, settings);

    ui.separator();
    ui.heading("Light");
    changed |= ui.checkbox(&mut settings.manual_light_only, "Manual light only").changed();
    changed |= ui.checkbox(&mut settings.use_spot_light, "Spot light").changed();
    changed |= spot_controls(ui, settings);

    changed
}

/// Only meaningful with a border-clamped map
fn border_controls(ui: &mut egui::Ui, settings: &mut RenderSettings) -> bool {
    ui.add_enabled_ui(settings.clamp_mode == ClampMode::Border, |ui| {
        ui.checkbox(&mut settings.border_shadowed, "Border in shadow").changed()
    })
    .inner
}

fn offset_controls(ui: &mut egui::Ui, settings: &mut RenderSettings) -> bool {
    ui.add_enabled_ui(settings.polygon_offset, |ui| {
        let mut changed = ui
            .add(egui::Slider::new(&mut settings.offset_factor, OFFSET_FACTOR_RANGE).text("Factor"))
            .changed();
        changed |= ui
            .add(egui::Slider::new(&mut settings.offset_units, OFFSET_UNITS_RANGE).text("Units"))
            .changed();
        changed
    })
    .inner
}

fn spot_controls(ui: &mut egui::Ui, settings: &mut RenderSettings) -> bool {
    ui.add_enabled_ui(settings.use_spot_light, |ui| {
        let mut changed = ui
            .add(
                egui::Slider::new(&mut settings.inner_spot_angle, SPOT_ANGLE_RANGE)
                    .text("Inner angle"),
            )
            .changed();
        changed |= ui
            .add(
                egui::Slider::new(&mut settings.outer_spot_angle, SPOT_ANGLE_RANGE)
                    .text("Outer angle"),
            )
            .changed();
        changed |= ui.checkbox(&mut settings.soft_falloff, "Soft falloff").changed();
        changed
    })
    .inner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_without_input_changes_nothing() {
        let ctx = egui::Context::default();
        let mut settings = RenderSettings::default();
        let mut changed = true;

        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| {
                changed = settings_panel(ui, &mut settings);
            });
        });

        assert!(!changed);
        assert_eq!(settings, RenderSettings::default());
    }

    type Section = fn(&mut egui::Ui, &mut RenderSettings) -> bool;

    /// Lay out `section` once, then press and release the primary button at `pos`
    fn click(section: Section, settings: &mut RenderSettings, pos: egui::Pos2) -> bool {
        let ctx = egui::Context::default();
        let screen = egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(400.0, 300.0));
        let button = |pressed| egui::Event::PointerButton {
            pos,
            button: egui::PointerButton::Primary,
            pressed,
            modifiers: egui::Modifiers::default(),
        };
        let frames = [
            vec![],
            vec![egui::Event::PointerMoved(pos), button(true)],
            vec![button(false)],
        ];

        let mut changed = false;
        for events in frames {
            let input = egui::RawInput {
                screen_rect: Some(screen),
                events,
                ..Default::default()
            };
            let _ = ctx.run(input, |ctx| {
                egui::CentralPanel::default().show(ctx, |ui| {
                    changed |= section(ui, settings);
                });
            });
        }
        changed
    }

    // first row of a central panel: 8px margin, 18px rows
    const CHECKBOX: egui::Pos2 = egui::pos2(17.0, 17.0);
    const SLIDER_RAIL: egui::Pos2 = egui::pos2(38.0, 17.0);

    #[test]
    fn border_checkbox_ignores_clicks_under_edge_clamp() {
        let mut settings = RenderSettings {
            clamp_mode: ClampMode::Edge,
            ..Default::default()
        };
        assert!(!click(border_controls, &mut settings, CHECKBOX));
        assert!(!settings.border_shadowed);

        settings.clamp_mode = ClampMode::Border;
        assert!(click(border_controls, &mut settings, CHECKBOX));
        assert!(settings.border_shadowed);
    }

    #[test]
    fn offset_sliders_ignore_clicks_when_offset_is_off() {
        let mut settings = RenderSettings {
            polygon_offset: false,
            ..Default::default()
        };
        assert!(!click(offset_controls, &mut settings, SLIDER_RAIL));
        assert_eq!(settings.offset_factor, 1.87);
        assert_eq!(settings.offset_units, 1.0);

        settings.polygon_offset = true;
        assert!(click(offset_controls, &mut settings, SLIDER_RAIL));
        assert_ne!(settings.offset_factor, 1.87);
    }
}
