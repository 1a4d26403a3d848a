use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Local;
use eframe::egui::{self, Align2, Color32, RichText, ScrollArea, TextEdit, TopBottomPanel, Ui};

use crate::alarm::list::AlarmRow;
use crate::alarm::model::{AlarmSound, Cookie, Recurrence};
use crate::api::ApiSharedState;
use crate::controller::{AlarmController, NoticeKind};
use crate::service::scheduler::AlarmScheduler;
use crate::service::settings::SettingsStore;
use crate::service::sound::{CommandPlayer, SoundPreview};
use crate::ui::dialog::AlarmForm;

const API_PUBLISH_INTERVAL: Duration = Duration::from_millis(250);
const IDLE_REPAINT: Duration = Duration::from_millis(500);

pub struct GuiOptions {
    pub title: String,
    pub api_state: Option<Arc<Mutex<ApiSharedState>>>,
    pub api_label: Option<String>,
}

pub fn run_gui<S, K>(
    controller: AlarmController<S, K>,
    preview: SoundPreview<CommandPlayer>,
    options: GuiOptions,
) -> Result<()>
where
    S: AlarmScheduler + 'static,
    K: SettingsStore + 'static,
{
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(options.title.clone())
            .with_inner_size([720.0, 480.0])
            .with_min_inner_size([480.0, 320.0]),
        ..Default::default()
    };

    let title = options.title.clone();
    let app = PocketAlarmApp::new(controller, preview, options);
    eframe::run_native(
        &title,
        native_options,
        Box::new(move |cc| {
            configure_theme(&cc.egui_ctx);
            Ok(Box::new(app))
        }),
    )
    .map_err(|err| anyhow::anyhow!("failed to launch {title} GUI: {err}"))?;

    Ok(())
}

fn configure_theme(ctx: &egui::Context) {
    let mut visuals = egui::Visuals::dark();
    visuals.override_text_color = Some(Color32::from_rgb(232, 232, 226));
    visuals.panel_fill = Color32::from_rgb(20, 22, 26);
    visuals.window_fill = Color32::from_rgb(30, 33, 38);
    visuals.selection.bg_fill = Color32::from_rgb(206, 122, 42);
    ctx.set_visuals(visuals);
}

enum DialogOutcome {
    Open,
    Save,
    Cancel,
}

struct PocketAlarmApp<S, K> {
    controller: AlarmController<S, K>,
    preview: SoundPreview<CommandPlayer>,
    dialog: Option<AlarmForm>,
    confirm_remove: Option<Cookie>,
    show_about: bool,
    status_message: Option<(String, NoticeKind, Instant)>,
    api_state: Option<Arc<Mutex<ApiSharedState>>>,
    api_label: Option<String>,
    was_focused: bool,
    next_api_publish: Instant,
}

impl<S: AlarmScheduler, K: SettingsStore> PocketAlarmApp<S, K> {
    fn new(
        mut controller: AlarmController<S, K>,
        preview: SoundPreview<CommandPlayer>,
        options: GuiOptions,
    ) -> Self {
        // Failures are kept as a notice and shown on the first frame.
        let _ = controller.refresh();
        Self {
            controller,
            preview,
            dialog: None,
            confirm_remove: None,
            show_about: false,
            status_message: None,
            api_state: options.api_state,
            api_label: options.api_label,
            was_focused: true,
            next_api_publish: Instant::now(),
        }
    }

    fn set_status(&mut self, text: impl Into<String>, kind: NoticeKind, ttl: Duration) {
        self.status_message = Some((text.into(), kind, Instant::now() + ttl));
    }

    fn sync_modal_flag(&mut self) {
        if self.dialog.is_some() || self.confirm_remove.is_some() || self.show_about {
            self.controller.open_modal();
        } else {
            self.controller.close_modal();
        }
    }

    fn take_api_refresh_request(&self) -> bool {
        let Some(shared) = &self.api_state else {
            return false;
        };
        match shared.lock() {
            Ok(mut guard) => guard.take_refresh_request(),
            Err(_) => false,
        }
    }

    fn publish_api_state(&mut self, now: Instant) {
        if now < self.next_api_publish {
            return;
        }
        self.next_api_publish = now + API_PUBLISH_INTERVAL;
        let Some(shared) = &self.api_state else {
            return;
        };
        match shared.lock() {
            Ok(mut guard) => guard.publish(self.controller.rows(), Local::now().timestamp_millis()),
            Err(_) => tracing::warn!("api_state_lock_poisoned"),
        }
    }

    fn open_edit_dialog(&mut self, cookie: Cookie) {
        match self.controller.load(cookie) {
            Ok(record) => self.dialog = Some(AlarmForm::from_record(cookie, &record)),
            Err(err) => self.set_status(err.to_string(), NoticeKind::Error, Duration::from_secs(4)),
        }
    }

    fn show_toolbar(&mut self, ui: &mut Ui) {
        let idle = !self.controller.is_busy();
        let selected = self.controller.selected();
        ui.horizontal(|ui| {
            if ui.add_enabled(idle, egui::Button::new("Add")).clicked() {
                self.dialog = Some(AlarmForm::for_new(Local::now().timestamp()));
            }
            if ui
                .add_enabled(idle && selected.is_some(), egui::Button::new("Edit"))
                .clicked()
                && let Some(cookie) = selected
            {
                self.open_edit_dialog(cookie);
            }
            if ui
                .add_enabled(idle && selected.is_some(), egui::Button::new("Remove"))
                .clicked()
            {
                self.confirm_remove = selected;
            }
            if ui.button("About").clicked() {
                self.show_about = true;
            }
        });
    }

    fn show_alarm_list(&mut self, ui: &mut Ui) {
        let rows: Vec<AlarmRow> = self.controller.rows().to_vec();
        if rows.is_empty() {
            ui.label(
                RichText::new("No alarms scheduled.")
                    .color(Color32::from_rgb(190, 190, 180))
                    .italics(),
            );
            return;
        }

        let selected = self.controller.selected();
        let mut clicked: Option<Cookie> = None;
        let mut edit: Option<Cookie> = None;
        let mut toggled: Option<(Cookie, bool)> = None;

        ui.add_enabled_ui(!self.controller.is_busy(), |ui| {
            ScrollArea::vertical().id_salt("alarms_scroll").show(ui, |ui| {
                egui::Grid::new("alarms_grid")
                    .striped(true)
                    .num_columns(5)
                    .show(ui, |ui| {
                        for row in &rows {
                            ui.label(RichText::new(row.snooze_marker()).monospace().strong());
                            let mut enabled = self
                                .controller
                                .displayed_enabled(row.cookie)
                                .unwrap_or_else(|| row.is_enabled());
                            if ui.checkbox(&mut enabled, "").changed() {
                                toggled = Some((row.cookie, enabled));
                            }
                            let label = ui.selectable_label(
                                selected == Some(row.cookie),
                                RichText::new(row.time_text()).monospace(),
                            );
                            if label.double_clicked() {
                                edit = Some(row.cookie);
                            } else if label.clicked() {
                                clicked = Some(row.cookie);
                            }
                            ui.label(row.repeat_text());
                            ui.label(row.record.message.lines().next().unwrap_or_default());
                            ui.end_row();
                        }
                    });
            });
        });

        if let Some(cookie) = clicked {
            self.controller.select(cookie);
        }
        if let Some(cookie) = edit {
            self.controller.select(cookie);
            self.open_edit_dialog(cookie);
        }
        if let Some((cookie, enabled)) = toggled {
            self.controller.request_toggle(cookie, enabled, Instant::now());
        }
    }

    fn show_dialog(&mut self, ctx: &egui::Context) {
        let Some(mut form) = self.dialog.take() else {
            return;
        };
        let outcome = show_alarm_form(ctx, &mut form, &mut self.preview);
        match outcome {
            DialogOutcome::Open => self.dialog = Some(form),
            DialogOutcome::Cancel => self.preview.stop(),
            DialogOutcome::Save => {
                let fields = match form.to_fields() {
                    Ok(fields) => fields,
                    Err(err) => {
                        form.error = Some(err.to_string());
                        self.dialog = Some(form);
                        return;
                    }
                };
                let now = Local::now().timestamp();
                let result = match form.editing {
                    Some(cookie) => self.controller.edit(cookie, &fields, now).map(|_| ()),
                    None => self.controller.add(&fields, now).map(|_| ()),
                };
                match result {
                    Err(err) if err.is_validation() => {
                        form.error = Some(err.to_string());
                        self.dialog = Some(form);
                    }
                    _ => self.preview.stop(),
                }
            }
        }
    }

    fn show_remove_confirmation(&mut self, ctx: &egui::Context) {
        let Some(cookie) = self.confirm_remove else {
            return;
        };
        let mut answer: Option<bool> = None;
        egui::Window::new("Remove alarm")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label("Remove this alarm?");
                ui.horizontal(|ui| {
                    if ui.button("Remove").clicked() {
                        answer = Some(true);
                    }
                    if ui.button("Cancel").clicked() {
                        answer = Some(false);
                    }
                });
            });
        match answer {
            Some(true) => {
                self.confirm_remove = None;
                let _ = self.controller.remove(cookie);
            }
            Some(false) => self.confirm_remove = None,
            None => {}
        }
    }

    fn show_about_window(&mut self, ctx: &egui::Context) {
        if !self.show_about {
            return;
        }
        let mut open = true;
        egui::Window::new("About")
            .collapsible(false)
            .resizable(false)
            .open(&mut open)
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.heading(env!("CARGO_PKG_NAME"));
                ui.label(format!("Version {}", env!("CARGO_PKG_VERSION")));
                ui.label("Schedules alarms and keeps disabled ones ready to re-enable.");
            });
        self.show_about = open;
    }
}

fn show_alarm_form(
    ctx: &egui::Context,
    form: &mut AlarmForm,
    preview: &mut SoundPreview<CommandPlayer>,
) -> DialogOutcome {
    let mut outcome = DialogOutcome::Open;
    egui::Window::new(form.title())
        .collapsible(false)
        .resizable(false)
        .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            egui::Grid::new("alarm_form_grid")
                .num_columns(2)
                .show(ui, |ui| {
                    ui.label("Date");
                    ui.add(TextEdit::singleline(&mut form.date_text).hint_text("YYYY-MM-DD"));
                    ui.end_row();

                    ui.label("Time");
                    ui.horizontal(|ui| {
                        ui.add(egui::DragValue::new(&mut form.hour).range(0..=23));
                        ui.label(":");
                        ui.add(egui::DragValue::new(&mut form.minute).range(0..=59));
                    });
                    ui.end_row();

                    ui.label("Repeat");
                    egui::ComboBox::from_id_salt("alarm_repeat")
                        .selected_text(form.recurrence.label())
                        .show_ui(ui, |ui| {
                            for recurrence in Recurrence::ALL {
                                ui.selectable_value(
                                    &mut form.recurrence,
                                    recurrence,
                                    recurrence.label(),
                                );
                            }
                        });
                    ui.end_row();

                    ui.label("Sound");
                    ui.horizontal(|ui| {
                        let before = form.sound;
                        egui::ComboBox::from_id_salt("alarm_sound")
                            .selected_text(form.sound.label())
                            .show_ui(ui, |ui| {
                                for sound in AlarmSound::ALL {
                                    ui.selectable_value(&mut form.sound, sound, sound.label());
                                }
                            });
                        if form.sound != before {
                            preview.stop();
                        }
                        let label = if preview.is_playing() { "Stop" } else { "Play" };
                        if ui.button(label).clicked() {
                            preview.toggle(form.sound);
                        }
                    });
                    ui.end_row();

                    ui.label("Message");
                    ui.add(TextEdit::multiline(&mut form.message).desired_rows(3));
                    ui.end_row();
                });

            if let Some(error) = &form.error {
                ui.colored_label(Color32::from_rgb(255, 120, 110), error.as_str());
            }
            ui.horizontal(|ui| {
                if ui.button("Save").clicked() {
                    outcome = DialogOutcome::Save;
                }
                if ui.button("Cancel").clicked() {
                    outcome = DialogOutcome::Cancel;
                }
            });
        });
    outcome
}

impl<S: AlarmScheduler, K: SettingsStore> eframe::App for PocketAlarmApp<S, K> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        if let Some((_, _, expires_at)) = &self.status_message
            && now >= *expires_at
        {
            self.status_message = None;
        }

        let focused = ctx.input(|input| input.focused);
        let regained_focus = focused && !self.was_focused;
        self.was_focused = focused;
        if regained_focus {
            self.controller.on_external_change();
        }
        if !self.controller.is_modal_open() && self.take_api_refresh_request() {
            self.controller.on_external_change();
        }

        self.controller.poll(now);
        if let Some(notice) = self.controller.take_notice() {
            let ttl = match notice.kind {
                NoticeKind::Info => Duration::from_secs(3),
                NoticeKind::Error => Duration::from_secs(6),
            };
            self.set_status(notice.text, notice.kind, ttl);
        }

        let modal_open = self.controller.is_modal_open();
        TopBottomPanel::top("toolbar").resizable(false).show(ctx, |ui| {
            ui.add_enabled_ui(!modal_open, |ui| self.show_toolbar(ui));
        });

        TopBottomPanel::bottom("footer")
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal_wrapped(|ui| {
                    if let Some((text, kind, _)) = &self.status_message {
                        let color = match kind {
                            NoticeKind::Info => Color32::from_rgb(111, 228, 134),
                            NoticeKind::Error => Color32::from_rgb(255, 120, 110),
                        };
                        ui.label(RichText::new(text).color(color).strong());
                        ui.separator();
                    }
                    if let Some(label) = &self.api_label {
                        ui.label(
                            RichText::new(label.as_str()).color(Color32::from_rgb(161, 180, 201)),
                        );
                    }
                });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_enabled_ui(!modal_open, |ui| self.show_alarm_list(ui));
        });

        self.show_dialog(ctx);
        self.show_remove_confirmation(ctx);
        self.show_about_window(ctx);
        self.sync_modal_flag();
        self.publish_api_state(now);

        let wait = self
            .controller
            .time_until_toggle(Instant::now())
            .map_or(IDLE_REPAINT, |due| due.min(IDLE_REPAINT));
        ctx.request_repaint_after(wait);
    }
}
