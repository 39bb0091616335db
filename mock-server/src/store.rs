//! In-memory clinic state and the rules the real API enforces.

use std::collections::HashMap;

use chrono::{Datelike, Days, NaiveDate, NaiveTime, SecondsFormat, TimeDelta, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ServerError;
use crate::model::*;

/// Length of every appointment.
pub const APPOINTMENT_MINUTES: i64 = 30;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Admin,
    Doctor(String),
    Patient(String),
}

/// The authenticated user behind a request.
#[derive(Clone, Debug)]
pub struct Caller {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

impl Caller {
    pub fn require_admin(&self) -> Result<(), ServerError> {
        match self.role {
            Role::Admin => Ok(()),
            _ => Err(ServerError::Forbidden),
        }
    }

    pub fn doctor_id(&self) -> Result<&str, ServerError> {
        match &self.role {
            Role::Doctor(id) => Ok(id),
            _ => Err(ServerError::Forbidden),
        }
    }

    pub fn patient_id(&self) -> Result<&str, ServerError> {
        match &self.role {
            Role::Patient(id) => Ok(id),
            _ => Err(ServerError::Forbidden),
        }
    }
}

#[derive(Clone, Debug)]
struct UserRecord {
    id: i64,
    username: String,
    password: String,
    email: String,
    roles: Vec<String>,
    role: Role,
}

#[derive(Clone, Debug)]
pub struct StoredImage {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Appointment listing filters. Every field narrows the result.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentFilter {
    pub doctor_id: Option<String>,
    #[serde(skip)]
    pub patient_id: Option<String>,
    pub date: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub upcoming: Option<bool>,
}

pub struct Store {
    users: Vec<UserRecord>,
    tokens: HashMap<String, i64>,
    doctors: Vec<Doctor>,
    patients: Vec<Patient>,
    availability: Vec<AvailabilitySlot>,
    blocks: Vec<ScheduleBlock>,
    appointments: Vec<Appointment>,
    notes: Vec<Note>,
    images: HashMap<String, StoredImage>,
    next_note_id: i64,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate, ServerError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ServerError::BadRequest(format!("Fecha inválida: {value}")))
}

pub fn parse_time(value: &str) -> Result<NaiveTime, ServerError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| ServerError::BadRequest(format!("Hora inválida: {value}")))
}

fn check_window(start: &str, end: &str) -> Result<(), ServerError> {
    if parse_time(start)? >= parse_time(end)? {
        return Err(ServerError::BadRequest(
            "La hora de inicio debe ser anterior a la de fin".to_string(),
        ));
    }
    Ok(())
}

fn check_day(day: u8) -> Result<(), ServerError> {
    if day > 6 {
        return Err(ServerError::BadRequest(format!("Día de la semana inválido: {day}")));
    }
    Ok(())
}

fn required(field: &str, value: &str) -> Result<(), ServerError> {
    if value.trim().is_empty() {
        return Err(ServerError::BadRequest(format!("El campo {field} es requerido")));
    }
    Ok(())
}

/// JS-style weekday, 0 = Sunday.
fn weekday(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// End of an appointment starting at `start`, or `None` when it would run
/// past midnight.
fn slot_end(start: NaiveTime) -> Option<NaiveTime> {
    let (end, wrapped) = start.overflowing_add_signed(TimeDelta::minutes(APPOINTMENT_MINUTES));
    (wrapped == 0).then_some(end)
}

fn overlaps(start: NaiveTime, end: NaiveTime, other_start: &str, other_end: &str) -> bool {
    match (parse_time(other_start), parse_time(other_end)) {
        (Ok(os), Ok(oe)) => start < oe && end > os,
        _ => false,
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::seeded()
    }
}

impl Store {
    /// One user per role, one doctor available weekday mornings, one patient.
    pub fn seeded() -> Self {
        let created = now();
        let doctor = Doctor {
            id: "1".to_string(),
            name: "Dra. Laura Pérez".to_string(),
            email: "laura.perez@clinica.test".to_string(),
            specialization: "Cirugía plástica".to_string(),
            is_active: true,
            created_at: created.clone(),
            updated_at: created.clone(),
        };
        let patient = Patient {
            id: "1".to_string(),
            name: "Ana Gómez".to_string(),
            email: "ana.gomez@correo.test".to_string(),
            phone: Some("+34 600 000 000".to_string()),
            created_at: created.clone(),
            updated_at: created,
        };
        let availability = (1..=5)
            .map(|day| AvailabilitySlot {
                id: format!("av-{day}"),
                doctor_id: doctor.id.clone(),
                day_of_week: day,
                start_time: "09:00".to_string(),
                end_time: "13:00".to_string(),
                is_active: true,
            })
            .collect();
        let user = |id: i64, name: &str, role: &str, kind: Role| UserRecord {
            id,
            username: name.to_string(),
            password: format!("{name}123"),
            email: format!("{name}@clinica.test"),
            roles: vec![role.to_string()],
            role: kind,
        };

        Self {
            users: vec![
                user(1, "admin", "ROLE_USER", Role::Admin),
                user(2, "doctor", "ROLE_DOCTOR", Role::Doctor(doctor.id.clone())),
                user(3, "patient", "ROLE_PATIENT", Role::Patient(patient.id.clone())),
            ],
            tokens: HashMap::new(),
            doctors: vec![doctor],
            patients: vec![patient],
            availability,
            blocks: Vec::new(),
            appointments: Vec::new(),
            notes: Vec::new(),
            images: HashMap::new(),
            next_note_id: 1,
        }
    }

    // --- auth ---

    pub fn signin(&mut self, req: &SigninRequest) -> Result<AuthResponse, ServerError> {
        let user = self
            .users
            .iter()
            .find(|u| u.username == req.username && u.password == req.password)
            .ok_or(ServerError::InvalidCredentials)?;
        let token = new_id();
        self.tokens.insert(token.clone(), user.id);
        Ok(AuthResponse {
            token,
            token_type: "Bearer".to_string(),
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            roles: user.roles.clone(),
        })
    }

    pub fn caller(&self, token: &str) -> Option<Caller> {
        let user_id = self.tokens.get(token)?;
        let user = self.users.iter().find(|u| u.id == *user_id)?;
        Some(Caller {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
        })
    }

    // --- doctors ---

    pub fn doctors(&self) -> Vec<Doctor> {
        self.doctors.clone()
    }

    fn doctor_mut(&mut self, id: &str) -> Result<&mut Doctor, ServerError> {
        self.doctors
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| ServerError::NotFound("Doctor no encontrado".to_string()))
    }

    /// Active doctors, optionally narrowed by specialization and a name or
    /// specialization search, both case-insensitive.
    pub fn search_doctors(
        &self,
        specialization: Option<&str>,
        search: Option<&str>,
    ) -> Vec<Doctor> {
        let specialization = specialization.map(str::to_lowercase);
        let search = search.map(str::to_lowercase);
        self.doctors
            .iter()
            .filter(|d| d.is_active)
            .filter(|d| {
                specialization
                    .as_ref()
                    .is_none_or(|s| d.specialization.to_lowercase() == *s)
            })
            .filter(|d| {
                search.as_ref().is_none_or(|s| {
                    d.name.to_lowercase().contains(s) || d.specialization.to_lowercase().contains(s)
                })
            })
            .cloned()
            .collect()
    }

    pub fn active_doctor(&self, id: &str) -> Result<Doctor, ServerError> {
        self.doctors
            .iter()
            .find(|d| d.id == id && d.is_active)
            .cloned()
            .ok_or_else(|| ServerError::NotFound("Doctor no encontrado".to_string()))
    }

    pub fn create_doctor(&mut self, req: CreateDoctor) -> Result<Doctor, ServerError> {
        required("name", &req.name)?;
        required("email", &req.email)?;
        required("specialization", &req.specialization)?;
        self.ensure_email_free(&req.email, None)?;
        let created = now();
        let doctor = Doctor {
            id: new_id(),
            name: req.name,
            email: req.email,
            specialization: req.specialization,
            is_active: true,
            created_at: created.clone(),
            updated_at: created,
        };
        self.doctors.push(doctor.clone());
        Ok(doctor)
    }

    fn ensure_email_free(&self, email: &str, except: Option<&str>) -> Result<(), ServerError> {
        let taken = self
            .doctors
            .iter()
            .any(|d| d.email.eq_ignore_ascii_case(email) && Some(d.id.as_str()) != except);
        if taken {
            return Err(ServerError::conflict(
                "EMAIL_TAKEN",
                "Ya existe un doctor con ese email",
                json!({ "email": email }),
            ));
        }
        Ok(())
    }

    pub fn update_doctor(&mut self, id: &str, req: UpdateDoctor) -> Result<Doctor, ServerError> {
        if let Some(email) = &req.email {
            self.ensure_email_free(email, Some(id))?;
        }
        let doctor = self.doctor_mut(id)?;
        if let Some(name) = req.name {
            doctor.name = name;
        }
        if let Some(email) = req.email {
            doctor.email = email;
        }
        if let Some(specialization) = req.specialization {
            doctor.specialization = specialization;
        }
        if let Some(is_active) = req.is_active {
            doctor.is_active = is_active;
        }
        doctor.updated_at = now();
        Ok(doctor.clone())
    }

    /// Soft delete: the record stays, flagged inactive.
    pub fn deactivate_doctor(&mut self, id: &str) -> Result<(), ServerError> {
        let doctor = self.doctor_mut(id)?;
        doctor.is_active = false;
        doctor.updated_at = now();
        Ok(())
    }

    // --- availability ---

    pub fn availability(&self, doctor_id: &str) -> Vec<AvailabilitySlot> {
        self.availability
            .iter()
            .filter(|a| a.doctor_id == doctor_id)
            .cloned()
            .collect()
    }

    pub fn create_availability(
        &mut self,
        doctor_id: &str,
        req: CreateAvailability,
    ) -> Result<AvailabilitySlot, ServerError> {
        check_day(req.day_of_week)?;
        check_window(&req.start_time, &req.end_time)?;
        let slot = AvailabilitySlot {
            id: new_id(),
            doctor_id: doctor_id.to_string(),
            day_of_week: req.day_of_week,
            start_time: req.start_time,
            end_time: req.end_time,
            is_active: true,
        };
        self.availability.push(slot.clone());
        Ok(slot)
    }

    pub fn update_availability(
        &mut self,
        doctor_id: &str,
        id: &str,
        req: UpdateAvailability,
    ) -> Result<AvailabilitySlot, ServerError> {
        let slot = self
            .availability
            .iter_mut()
            .find(|a| a.id == id && a.doctor_id == doctor_id)
            .ok_or_else(|| ServerError::NotFound("Disponibilidad no encontrada".to_string()))?;
        let mut updated = slot.clone();
        if let Some(day) = req.day_of_week {
            updated.day_of_week = day;
        }
        if let Some(start) = req.start_time {
            updated.start_time = start;
        }
        if let Some(end) = req.end_time {
            updated.end_time = end;
        }
        if let Some(active) = req.is_active {
            updated.is_active = active;
        }
        check_day(updated.day_of_week)?;
        check_window(&updated.start_time, &updated.end_time)?;
        *slot = updated.clone();
        Ok(updated)
    }

    pub fn delete_availability(&mut self, doctor_id: &str, id: &str) -> Result<(), ServerError> {
        let before = self.availability.len();
        self.availability.retain(|a| !(a.id == id && a.doctor_id == doctor_id));
        if self.availability.len() == before {
            return Err(ServerError::NotFound("Disponibilidad no encontrada".to_string()));
        }
        Ok(())
    }

    // --- schedule blocks ---

    pub fn blocks(
        &self,
        doctor_id: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Vec<ScheduleBlock> {
        self.blocks
            .iter()
            .filter(|b| b.doctor_id == doctor_id)
            .filter(|b| start.is_none_or(|s| b.date.as_str() >= s))
            .filter(|b| end.is_none_or(|e| b.date.as_str() <= e))
            .cloned()
            .collect()
    }

    pub fn create_block(
        &mut self,
        doctor_id: &str,
        req: CreateScheduleBlock,
    ) -> Result<ScheduleBlock, ServerError> {
        parse_date(&req.date)?;
        check_window(&req.start_time, &req.end_time)?;
        let block = ScheduleBlock {
            id: new_id(),
            doctor_id: doctor_id.to_string(),
            date: req.date,
            start_time: req.start_time,
            end_time: req.end_time,
            reason: req.reason,
            block_type: req.block_type,
        };
        self.blocks.push(block.clone());
        Ok(block)
    }

    pub fn update_block(
        &mut self,
        doctor_id: &str,
        id: &str,
        req: UpdateScheduleBlock,
    ) -> Result<ScheduleBlock, ServerError> {
        let block = self
            .blocks
            .iter_mut()
            .find(|b| b.id == id && b.doctor_id == doctor_id)
            .ok_or_else(|| ServerError::NotFound("Bloqueo no encontrado".to_string()))?;
        let mut updated = block.clone();
        if let Some(date) = req.date {
            updated.date = date;
        }
        if let Some(start) = req.start_time {
            updated.start_time = start;
        }
        if let Some(end) = req.end_time {
            updated.end_time = end;
        }
        if req.reason.is_some() {
            updated.reason = req.reason;
        }
        if let Some(block_type) = req.block_type {
            updated.block_type = block_type;
        }
        parse_date(&updated.date)?;
        check_window(&updated.start_time, &updated.end_time)?;
        *block = updated.clone();
        Ok(updated)
    }

    pub fn delete_block(&mut self, doctor_id: &str, id: &str) -> Result<(), ServerError> {
        let before = self.blocks.len();
        self.blocks.retain(|b| !(b.id == id && b.doctor_id == doctor_id));
        if self.blocks.len() == before {
            return Err(ServerError::NotFound("Bloqueo no encontrado".to_string()));
        }
        Ok(())
    }

    // --- appointments ---

    fn expand(&self, appointment: &Appointment) -> Appointment {
        let mut full = appointment.clone();
        full.doctor = self.doctors.iter().find(|d| d.id == appointment.doctor_id).cloned();
        full.patient = self.patients.iter().find(|p| p.id == appointment.patient_id).cloned();
        full
    }

    pub fn appointments(&self, filter: &AppointmentFilter) -> Vec<Appointment> {
        let from_today = filter
            .upcoming
            .unwrap_or(false)
            .then(|| today().format("%Y-%m-%d").to_string());
        self.appointments
            .iter()
            .filter(|a| filter.doctor_id.as_ref().is_none_or(|id| a.doctor_id == *id))
            .filter(|a| filter.patient_id.as_ref().is_none_or(|id| a.patient_id == *id))
            .filter(|a| filter.date.as_ref().is_none_or(|d| a.date == *d))
            .filter(|a| filter.start_date.as_ref().is_none_or(|d| a.date >= *d))
            .filter(|a| filter.end_date.as_ref().is_none_or(|d| a.date <= *d))
            .filter(|a| filter.status.is_none_or(|s| a.status == s))
            .filter(|a| {
                from_today
                    .as_ref()
                    .is_none_or(|t| a.date >= *t && a.status.is_open())
            })
            .map(|a| self.expand(a))
            .collect()
    }

    /// One appointment, visible only inside `scope` (a doctor or patient id
    /// filter; `AppointmentFilter::default()` sees everything).
    pub fn appointment(
        &self,
        scope: &AppointmentFilter,
        id: &str,
    ) -> Result<Appointment, ServerError> {
        self.appointments
            .iter()
            .find(|a| {
                a.id == id
                    && scope.doctor_id.as_ref().is_none_or(|d| a.doctor_id == *d)
                    && scope.patient_id.as_ref().is_none_or(|p| a.patient_id == *p)
            })
            .map(|a| self.expand(a))
            .ok_or_else(|| ServerError::NotFound("Cita no encontrada".to_string()))
    }

    fn appointment_mut(
        &mut self,
        scope: &AppointmentFilter,
        id: &str,
    ) -> Result<&mut Appointment, ServerError> {
        self.appointments
            .iter_mut()
            .find(|a| {
                a.id == id
                    && scope.doctor_id.as_ref().is_none_or(|d| a.doctor_id == *d)
                    && scope.patient_id.as_ref().is_none_or(|p| a.patient_id == *p)
            })
            .ok_or_else(|| ServerError::NotFound("Cita no encontrada".to_string()))
    }

    /// A booking must sit inside an active availability slot, avoid
    /// vacation and break blocks, and not collide with another open booking.
    fn check_bookable(
        &self,
        doctor_id: &str,
        date: &str,
        time: &str,
        ignore: Option<&str>,
    ) -> Result<(), ServerError> {
        let day = parse_date(date)?;
        let start = parse_time(time)?;
        let doctor = self.active_doctor(doctor_id)?;
        let outside = || {
            ServerError::conflict(
                "OUTSIDE_AVAILABILITY",
                "El doctor no atiende en ese horario",
                json!({ "date": date, "time": time }),
            )
        };
        let end = slot_end(start).ok_or_else(outside)?;

        let inside_slot = self.availability.iter().any(|a| {
            a.doctor_id == doctor.id
                && a.is_active
                && a.day_of_week == weekday(day)
                && matches!(
                    (parse_time(&a.start_time), parse_time(&a.end_time)),
                    (Ok(s), Ok(e)) if s <= start && end <= e
                )
        });
        if !inside_slot {
            return Err(outside());
        }

        if let Some(block) = self.blocks.iter().find(|b| {
            b.doctor_id == doctor.id
                && b.date == date
                && b.block_type.blocks_booking()
                && overlaps(start, end, &b.start_time, &b.end_time)
        }) {
            return Err(ServerError::conflict(
                "SCHEDULE_BLOCKED",
                "El horario está bloqueado",
                json!({ "blockId": block.id, "type": block.block_type }),
            ));
        }

        let taken = self.appointments.iter().any(|a| {
            a.doctor_id == doctor.id
                && a.date == date
                && a.status.is_open()
                && Some(a.id.as_str()) != ignore
                && parse_time(&a.time)
                    .is_ok_and(|t| slot_end(t).is_none_or(|t_end| start < t_end) && end > t)
        });
        if taken {
            return Err(ServerError::conflict(
                "SLOT_UNAVAILABLE",
                "El horario seleccionado no está disponible",
                json!({ "date": date, "time": time }),
            ));
        }
        Ok(())
    }

    pub fn book(
        &mut self,
        patient_id: &str,
        req: CreateAppointment,
    ) -> Result<Appointment, ServerError> {
        self.check_bookable(&req.doctor_id, &req.date, &req.time, None)?;
        let created = now();
        let appointment = Appointment {
            id: new_id(),
            doctor_id: req.doctor_id,
            patient_id: patient_id.to_string(),
            doctor: None,
            patient: None,
            date: req.date,
            time: req.time,
            status: AppointmentStatus::Pending,
            notes: req.notes,
            created_at: created.clone(),
            updated_at: created,
        };
        self.appointments.push(appointment.clone());
        Ok(self.expand(&appointment))
    }

    pub fn reschedule(
        &mut self,
        patient_id: &str,
        id: &str,
        req: UpdateAppointment,
    ) -> Result<Appointment, ServerError> {
        let scope = AppointmentFilter {
            patient_id: Some(patient_id.to_string()),
            ..Default::default()
        };
        let current = self.appointment(&scope, id)?;
        if !current.status.is_open() {
            return Err(ServerError::conflict(
                "INVALID_TRANSITION",
                "La cita ya no se puede modificar",
                json!({ "status": current.status.as_str() }),
            ));
        }
        let date = req.date.unwrap_or(current.date);
        let time = req.time.unwrap_or(current.time);
        self.check_bookable(&current.doctor_id, &date, &time, Some(id))?;

        let appointment = self.appointment_mut(&scope, id)?;
        appointment.date = date;
        appointment.time = time;
        if req.notes.is_some() {
            appointment.notes = req.notes;
        }
        appointment.updated_at = now();
        let updated = appointment.clone();
        Ok(self.expand(&updated))
    }

    fn transition(
        &mut self,
        scope: &AppointmentFilter,
        id: &str,
        next: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<Appointment, ServerError> {
        let appointment = self.appointment_mut(scope, id)?;
        if !appointment.status.can_become(next) {
            return Err(ServerError::conflict(
                "INVALID_TRANSITION",
                "Transición de estado no permitida",
                json!({ "from": appointment.status.as_str(), "to": next.as_str() }),
            ));
        }
        appointment.status = next;
        if notes.is_some() {
            appointment.notes = notes;
        }
        appointment.updated_at = now();
        let updated = appointment.clone();
        Ok(self.expand(&updated))
    }

    pub fn update_status(
        &mut self,
        doctor_id: &str,
        id: &str,
        req: UpdateStatus,
    ) -> Result<Appointment, ServerError> {
        let scope = AppointmentFilter {
            doctor_id: Some(doctor_id.to_string()),
            ..Default::default()
        };
        self.transition(&scope, id, req.status, req.notes)
    }

    pub fn cancel(&mut self, patient_id: &str, id: &str) -> Result<(), ServerError> {
        let scope = AppointmentFilter {
            patient_id: Some(patient_id.to_string()),
            ..Default::default()
        };
        self.transition(&scope, id, AppointmentStatus::Cancelled, None)
            .map(|_| ())
    }

    /// Every bookable start time for `days` days from `from`, each flagged
    /// with whether it is still free.
    pub fn available_slots(
        &self,
        doctor_id: &str,
        from: NaiveDate,
        days: u32,
    ) -> Result<Vec<AvailableSlot>, ServerError> {
        let doctor = self.active_doctor(doctor_id)?;
        let mut slots = Vec::new();
        for offset in 0..u64::from(days) {
            let Some(day) = from.checked_add_days(Days::new(offset)) else {
                break;
            };
            let date = day.format("%Y-%m-%d").to_string();
            let mut windows: Vec<_> = self
                .availability
                .iter()
                .filter(|a| a.doctor_id == doctor.id && a.is_active)
                .filter(|a| a.day_of_week == weekday(day))
                .filter_map(|a| {
                    let start = parse_time(&a.start_time).ok()?;
                    Some((start, parse_time(&a.end_time).ok()?))
                })
                .collect();
            windows.sort();
            for (start, end) in windows {
                let mut time = start;
                while let Some(next) = slot_end(time).filter(|next| *next <= end) {
                    let label = time.format("%H:%M").to_string();
                    let available = self.check_bookable(&doctor.id, &date, &label, None).is_ok();
                    slots.push(AvailableSlot {
                        date: date.clone(),
                        time: label,
                        available,
                    });
                    time = next;
                }
            }
        }
        Ok(slots)
    }

    // --- notes ---

    /// Newest first; `owner` narrows to one user's notes.
    pub fn notes_page(&self, owner: Option<i64>, page: u32, size: u32) -> NotesPage {
        self.page_where(page, size, |n| owner.is_none_or(|o| n.user_id == o))
    }

    /// Newest first, only notes carrying an image.
    pub fn notes_with_images_page(&self, page: u32, size: u32) -> NotesPage {
        self.page_where(page, size, |n| n.image_filename.is_some())
    }

    fn page_where(&self, page: u32, size: u32, keep: impl Fn(&Note) -> bool) -> NotesPage {
        let notes: Vec<Note> = self.notes.iter().rev().filter(|n| keep(n)).cloned().collect();
        NotesPage::of(&notes, page, size)
    }

    pub fn note(&self, id: i64) -> Result<Note, ServerError> {
        self.notes
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or_else(|| ServerError::NotFound("Note not found".to_string()))
    }

    fn store_image(&mut self, filename: &str, image: StoredImage) -> String {
        let extension = match image.content_type.as_str() {
            "image/png" => "png",
            _ => filename.rsplit('.').next().filter(|e| *e != filename).unwrap_or("jpg"),
        };
        let stored = format!(
            "imagen_{}_{}.{extension}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            &new_id()[..8]
        );
        self.images.insert(stored.clone(), image);
        stored
    }

    pub fn create_note(
        &mut self,
        caller: &Caller,
        fields: NoteFields,
        image: Option<(String, StoredImage)>,
    ) -> Result<Note, ServerError> {
        required("title", &fields.title)?;
        required("description", &fields.description)?;
        let filename = image.map(|(name, image)| self.store_image(&name, image));
        let created = now();
        let note = Note {
            id: self.next_note_id,
            title: fields.title,
            subtitle: fields.subtitle.unwrap_or_default(),
            category: fields.category.unwrap_or_default(),
            description: fields.description,
            image_url: filename.as_ref().map(|f| format!("/api/notes/image/{f}")),
            image_filename: filename,
            created_at: created.clone(),
            updated_at: created,
            user_id: caller.user_id,
            username: Some(caller.username.clone()),
        };
        self.next_note_id += 1;
        self.notes.push(note.clone());
        Ok(note)
    }

    fn owned_note_mut(&mut self, caller: &Caller, id: i64) -> Result<&mut Note, ServerError> {
        let note = self
            .notes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| ServerError::NotFound("Note not found".to_string()))?;
        if note.user_id != caller.user_id && caller.role != Role::Admin {
            return Err(ServerError::Forbidden);
        }
        Ok(note)
    }

    pub fn update_note(
        &mut self,
        caller: &Caller,
        id: i64,
        fields: NoteFields,
        image: Option<(String, StoredImage)>,
    ) -> Result<Note, ServerError> {
        required("title", &fields.title)?;
        required("description", &fields.description)?;
        self.owned_note_mut(caller, id)?;
        let filename = image.map(|(name, image)| self.store_image(&name, image));
        let note = self.owned_note_mut(caller, id)?;
        note.title = fields.title;
        note.description = fields.description;
        if let Some(subtitle) = fields.subtitle {
            note.subtitle = subtitle;
        }
        if let Some(category) = fields.category {
            note.category = category;
        }
        if let Some(filename) = filename {
            note.image_url = Some(format!("/api/notes/image/{filename}"));
            note.image_filename = Some(filename);
        }
        note.updated_at = now();
        Ok(note.clone())
    }

    pub fn delete_note(&mut self, caller: &Caller, id: i64) -> Result<(), ServerError> {
        let note = self.owned_note_mut(caller, id)?;
        let image = note.image_filename.clone();
        self.notes.retain(|n| n.id != id);
        if let Some(image) = image {
            self.images.remove(&image);
        }
        Ok(())
    }

    pub fn image(&self, filename: &str) -> Option<StoredImage> {
        self.images.get(filename).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Next date at or after 2030-01-07 (a Monday) with `weekday`.
    fn on(weekday: u8) -> String {
        let monday = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap();
        let offset = (u64::from(weekday) + 6) % 7;
        (monday + Days::new(offset)).format("%Y-%m-%d").to_string()
    }

    fn booking(time: &str) -> CreateAppointment {
        CreateAppointment {
            doctor_id: "1".to_string(),
            date: on(1),
            time: time.to_string(),
            notes: None,
        }
    }

    #[test]
    fn seeded_users_sign_in() {
        let mut store = Store::seeded();
        let auth = store
            .signin(&SigninRequest {
                username: "doctor".to_string(),
                password: "doctor123".to_string(),
            })
            .unwrap();
        let caller = store.caller(&auth.token).unwrap();
        assert_eq!(caller.doctor_id().unwrap(), "1");
        assert!(caller.require_admin().is_err());
    }

    #[test]
    fn booking_respects_availability_blocks_and_existing_bookings() {
        let mut store = Store::seeded();
        store.book("1", booking("09:30")).unwrap();

        let err = store.book("1", booking("09:30")).unwrap_err();
        assert!(matches!(err, ServerError::Conflict { code: "SLOT_UNAVAILABLE", .. }));

        let err = store.book("1", booking("12:45")).unwrap_err();
        assert!(matches!(err, ServerError::Conflict { code: "OUTSIDE_AVAILABILITY", .. }));

        store
            .create_block(
                "1",
                CreateScheduleBlock {
                    date: on(1),
                    start_time: "11:00".to_string(),
                    end_time: "12:00".to_string(),
                    reason: None,
                    block_type: BlockType::Break,
                },
            )
            .unwrap();
        let err = store.book("1", booking("11:30")).unwrap_err();
        assert!(matches!(err, ServerError::Conflict { code: "SCHEDULE_BLOCKED", .. }));
    }

    #[test]
    fn meeting_blocks_do_not_prevent_booking() {
        let mut store = Store::seeded();
        store
            .create_block(
                "1",
                CreateScheduleBlock {
                    date: on(1),
                    start_time: "10:00".to_string(),
                    end_time: "11:00".to_string(),
                    reason: Some("Sesión clínica".to_string()),
                    block_type: BlockType::Meeting,
                },
            )
            .unwrap();
        assert!(store.book("1", booking("10:00")).is_ok());
    }

    #[test]
    fn slots_flag_taken_times() {
        let mut store = Store::seeded();
        store.book("1", booking("09:00")).unwrap();
        let from = parse_date(&on(1)).unwrap();
        let slots = store.available_slots("1", from, 1).unwrap();
        assert_eq!(slots.len(), 8);
        assert!(!slots[0].available);
        assert!(slots[1].available);
        assert_eq!(slots[7].time, "12:30");

        // Sunday has no availability.
        let sunday = parse_date(&on(0)).unwrap();
        assert!(store.available_slots("1", sunday, 1).unwrap().is_empty());
    }

    fn add_monday_window(store: &mut Store, start: &str, end: &str) {
        store
            .create_availability(
                "1",
                CreateAvailability {
                    day_of_week: 1,
                    start_time: start.to_string(),
                    end_time: end.to_string(),
                },
            )
            .unwrap();
    }

    #[test]
    fn late_window_slots_stop_before_midnight() {
        let mut store = Store::seeded();
        add_monday_window(&mut store, "23:00", "23:30");
        let from = parse_date(&on(1)).unwrap();
        let slots = store.available_slots("1", from, 1).unwrap();
        let late: Vec<_> = slots.iter().filter(|s| s.time.starts_with("23")).collect();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].time, "23:00");

        add_monday_window(&mut store, "23:30", "23:59");
        let slots = store.available_slots("1", from, 1).unwrap();
        assert!(!slots.iter().any(|s| s.time == "23:30"));
    }

    #[test]
    fn booking_may_not_run_past_the_window_end() {
        let mut store = Store::seeded();
        add_monday_window(&mut store, "23:00", "23:59");
        let err = store.book("1", booking("23:45")).unwrap_err();
        assert!(matches!(err, ServerError::Conflict { code: "OUTSIDE_AVAILABILITY", .. }));
        assert!(store.book("1", booking("23:00")).is_ok());
    }

    #[test]
    fn closed_appointments_cannot_move() {
        let mut store = Store::seeded();
        let booked = store.book("1", booking("10:00")).unwrap();
        store.cancel("1", &booked.id).unwrap();

        let err = store
            .update_status(
                "1",
                &booked.id,
                UpdateStatus {
                    status: AppointmentStatus::Confirmed,
                    notes: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServerError::Conflict { code: "INVALID_TRANSITION", .. }));

        // The freed time can be booked again.
        assert!(store.book("1", booking("10:00")).is_ok());
    }

    #[test]
    fn deactivated_doctor_stays_listed_but_not_bookable() {
        let mut store = Store::seeded();
        store.deactivate_doctor("1").unwrap();
        assert!(!store.doctors()[0].is_active);
        assert!(store.search_doctors(None, None).is_empty());
        assert!(matches!(
            store.book("1", booking("09:00")).unwrap_err(),
            ServerError::NotFound(_)
        ));
    }
}
