use busline_core::{
    Booking, BookingStatus, Bus, BusStatus, CoreResult, Passenger, PaymentStatus, Seat,
    SeatReservation, Ticket, Trip, TripStatus,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

// Internal structs for type-safe querying

pub(crate) const TRIP_COLUMNS: &str = "id, route_id, bus_id, start_time, end_time, price, status";
pub(crate) const BUS_COLUMNS: &str = "id, status, seat_map_id";
pub(crate) const RESERVATION_COLUMNS: &str =
    "id, trip_id, seat_id, session_id, booking_id, created_at, expires_at";
pub(crate) const BOOKING_COLUMNS: &str = "id, trip_id, user_id, contact_email, contact_phone, status, \
     payment_status, total_seats, total_amount, created_at, updated_at, expires_at";

#[derive(sqlx::FromRow)]
pub(crate) struct TripRow {
    id: Uuid,
    route_id: Uuid,
    bus_id: Option<Uuid>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    price: i32,
    status: String,
}

impl TripRow {
    pub(crate) fn into_trip(self) -> CoreResult<Trip> {
        Ok(Trip {
            id: self.id,
            route_id: self.route_id,
            bus_id: self.bus_id,
            start_time: self.start_time,
            end_time: self.end_time,
            price: self.price,
            status: TripStatus::parse(&self.status)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BusRow {
    id: Uuid,
    status: String,
    seat_map_id: Uuid,
}

impl BusRow {
    pub(crate) fn into_bus(self) -> CoreResult<Bus> {
        Ok(Bus {
            id: self.id,
            status: BusStatus::parse(&self.status)?,
            seat_map_id: self.seat_map_id,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SeatRow {
    id: Uuid,
    seat_map_id: Uuid,
    seat_number: String,
    seat_row: i32,
    seat_column: i32,
    bookable: bool,
}

impl From<SeatRow> for Seat {
    fn from(row: SeatRow) -> Self {
        Seat {
            id: row.id,
            seat_map_id: row.seat_map_id,
            seat_number: row.seat_number,
            row: row.seat_row,
            column: row.seat_column,
            bookable: row.bookable,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ReservationRow {
    id: Uuid,
    trip_id: Uuid,
    seat_id: Uuid,
    session_id: String,
    booking_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<ReservationRow> for SeatReservation {
    fn from(row: ReservationRow) -> Self {
        SeatReservation {
            id: row.id,
            trip_id: row.trip_id,
            seat_id: row.seat_id,
            session_id: row.session_id,
            booking_id: row.booking_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BookingRow {
    id: Uuid,
    trip_id: Uuid,
    user_id: Option<String>,
    contact_email: Option<String>,
    contact_phone: Option<String>,
    status: String,
    payment_status: String,
    total_seats: i32,
    total_amount: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl BookingRow {
    pub(crate) fn into_booking(self) -> CoreResult<Booking> {
        Ok(Booking {
            id: self.id,
            trip_id: self.trip_id,
            user_id: self.user_id,
            contact_email: self.contact_email,
            contact_phone: self.contact_phone,
            status: BookingStatus::parse(&self.status)?,
            payment_status: PaymentStatus::parse(&self.payment_status)?,
            total_seats: self.total_seats,
            total_amount: self.total_amount,
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PassengerRow {
    id: Uuid,
    booking_id: Uuid,
    seat_id: Uuid,
    seat_number: String,
    name: String,
    phone: Option<String>,
    price: i32,
}

impl From<PassengerRow> for Passenger {
    fn from(row: PassengerRow) -> Self {
        Passenger {
            id: row.id,
            booking_id: row.booking_id,
            seat_id: row.seat_id,
            seat_number: row.seat_number,
            name: row.name,
            phone: row.phone,
            price: row.price,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct TicketRow {
    id: Uuid,
    booking_id: Uuid,
    passenger_id: Uuid,
    trip_id: Uuid,
    ticket_number: String,
    is_used: bool,
    used_at: Option<DateTime<Utc>>,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Ticket {
            id: row.id,
            booking_id: row.booking_id,
            passenger_id: row.passenger_id,
            trip_id: row.trip_id,
            ticket_number: row.ticket_number,
            is_used: row.is_used,
            used_at: row.used_at,
        }
    }
}

pub(crate) fn trips(rows: Vec<TripRow>) -> CoreResult<Vec<Trip>> {
    rows.into_iter().map(TripRow::into_trip).collect()
}

pub(crate) fn buses(rows: Vec<BusRow>) -> CoreResult<Vec<Bus>> {
    rows.into_iter().map(BusRow::into_bus).collect()
}

pub(crate) fn bookings(rows: Vec<BookingRow>) -> CoreResult<Vec<Booking>> {
    rows.into_iter().map(BookingRow::into_booking).collect()
}
