//! Outbound message texts.

use chrono::{Datelike, NaiveDate, NaiveTime};

use clinibook_core::schedule::format_clock_time;

const WEEKDAYS: [&str; 7] = ["lunes", "martes", "miércoles", "jueves", "viernes", "sábado", "domingo"];
const MONTHS: [&str; 12] = [
    "enero", "febrero", "marzo", "abril", "mayo", "junio", "julio", "agosto", "septiembre", "octubre",
    "noviembre", "diciembre",
];

/// "lunes 20 de julio"
pub fn long_date(date: NaiveDate) -> String {
    let weekday = WEEKDAYS[date.weekday().num_days_from_monday() as usize];
    let month = MONTHS[date.month0() as usize];
    format!("{weekday} {} de {month}", date.day())
}

pub fn slot_list(slots: &[NaiveTime]) -> String {
    let formatted = slots.iter().map(|slot| format_clock_time(*slot)).collect::<Vec<_>>();
    match formatted.as_slice() {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} o {last}", init.join(", ")),
    }
}

pub fn welcome_intro(clinic: &str) -> String {
    format!("¡Hola! Soy el asistente de citas de {clinic}.")
}

pub fn ask_name() -> String {
    "¿Me dices tu nombre, por favor?".to_owned()
}

pub fn ask_treatment(name: &str, labels: &[&str]) -> String {
    format!("Encantado, {name}. ¿Qué tratamiento necesitas? Tenemos: {}.", labels.join(", "))
}

pub fn unknown_treatment(labels: &[&str]) -> String {
    format!("No he reconocido el tratamiento. Elige uno de estos: {}.", labels.join(", "))
}

pub fn ask_date(treatment: &str) -> String {
    format!("Perfecto, {treatment}. ¿Qué día te vendría bien? Puedes decirme \"mañana\", \"el jueves\" o \"20 de julio\".")
}

pub fn date_unclear() -> String {
    "No he entendido la fecha. ¿Me indicas un día concreto, por ejemplo \"el martes\" o \"15/09\"?".to_owned()
}

pub fn date_in_past() -> String {
    "Esa fecha ya ha pasado. ¿Qué otro día te viene bien?".to_owned()
}

pub fn date_blocked(date: NaiveDate) -> String {
    format!("El {} la clínica está cerrada. ¿Te viene bien otro día?", long_date(date))
}

pub fn date_closed(date: NaiveDate) -> String {
    format!("No abrimos el {}. ¿Prefieres otro día?", long_date(date))
}

pub fn date_full(date: NaiveDate) -> String {
    format!("El {} ya no quedan huecos libres. ¿Probamos con otro día?", long_date(date))
}

pub fn offer_slots(date: NaiveDate, slots: &[NaiveTime]) -> String {
    format!("El {} tengo libre a las {}. ¿Qué hora prefieres?", long_date(date), slot_list(slots))
}

pub fn ask_time(slots: &[NaiveTime]) -> String {
    format!("¿A qué hora te viene bien? Tengo libre a las {}.", slot_list(slots))
}

pub fn time_unavailable(time: NaiveTime, alternatives: &[NaiveTime]) -> String {
    format!(
        "A las {} no está disponible. Las horas más cercanas son {}. ¿Te sirve alguna?",
        format_clock_time(time),
        slot_list(alternatives)
    )
}

pub fn confirm(treatment: &str, date: NaiveDate, time: NaiveTime) -> String {
    format!(
        "¿Confirmo tu cita de {treatment} el {} a las {}? Responde sí o no.",
        long_date(date),
        format_clock_time(time)
    )
}

pub fn confirm_again() -> String {
    "¿Confirmamos la cita? Responde sí o no.".to_owned()
}

pub fn booked(treatment: &str, date: NaiveDate, time: NaiveTime) -> String {
    format!(
        "¡Listo! Tu cita de {treatment} queda reservada el {} a las {}. Si necesitas cancelarla, escríbenos.",
        long_date(date),
        format_clock_time(time)
    )
}

pub fn slot_lost(alternatives: &[NaiveTime]) -> String {
    format!(
        "Lo siento, esa hora se acaba de ocupar. Aún quedan libres las {}. ¿Cuál prefieres?",
        slot_list(alternatives)
    )
}

pub fn day_filled_up() -> String {
    "Lo siento, ese día se ha completado mientras hablábamos. ¿Qué otro día te viene bien?".to_owned()
}

pub fn stale_date() -> String {
    "La fecha que habíamos elegido ya no está disponible. ¿Qué otro día te viene bien?".to_owned()
}

pub fn declined() -> String {
    "Sin problema. ¿Qué otro día te vendría bien?".to_owned()
}

pub fn booked_summary() -> String {
    "Tu cita ya está reservada. ¿Quieres pedir otra cita o cancelar la que tienes?".to_owned()
}

pub fn new_booking() -> String {
    "Vamos con otra cita. ¿Qué día te vendría bien?".to_owned()
}

pub fn cancelled(date: NaiveDate, time: NaiveTime) -> String {
    format!(
        "He cancelado tu cita del {} a las {}. Si quieres otra, dime qué día te viene bien.",
        long_date(date),
        format_clock_time(time)
    )
}

pub fn nothing_to_cancel() -> String {
    "No encuentro ninguna cita activa a tu nombre. ¿Quieres pedir una nueva?".to_owned()
}

pub fn session_reset() -> String {
    "Hemos tenido un problema con tu conversación y empezamos de nuevo.".to_owned()
}

pub fn transport_apology() -> String {
    "Ahora mismo no puedo consultar la agenda. Inténtalo de nuevo en unos minutos, por favor.".to_owned()
}

pub fn storage_apology() -> String {
    "Lo siento, hemos tenido un problema técnico. Inténtalo de nuevo en unos minutos.".to_owned()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::{long_date, slot_list};

    #[test]
    fn dates_and_slot_lists_read_naturally() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 20).expect("date");
        assert_eq!(long_date(date), "lunes 20 de julio");

        let slots = [9, 10, 11].map(|h| NaiveTime::from_hms_opt(h, 0, 0).expect("time"));
        assert_eq!(slot_list(&slots), "09:00, 10:00 o 11:00");
        assert_eq!(slot_list(&slots[..1]), "09:00");
    }
}
