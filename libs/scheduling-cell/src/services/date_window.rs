use chrono::{Days, Local, NaiveDate};

use shared_config::SchedulingConfig;

/// Rolling booking horizon of `horizon_days` dates starting today, paged
/// `page_days` at a time. Pure: "today" is captured once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    today: NaiveDate,
    horizon_days: u32,
    page_days: u32,
}

impl DateWindow {
    pub fn new(today: NaiveDate, config: SchedulingConfig) -> Self {
        let config = config.clamped();
        Self {
            today,
            horizon_days: config.horizon_days,
            page_days: config.page_days,
        }
    }

    pub fn starting(today: NaiveDate) -> Self {
        Self::new(today, SchedulingConfig::default())
    }

    /// Window anchored on the viewer's local calendar date.
    pub fn from_local_clock(config: SchedulingConfig) -> Self {
        Self::new(Local::now().date_naive(), config)
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn page_days(&self) -> u32 {
        self.page_days
    }

    pub fn last_day(&self) -> NaiveDate {
        self.offset(self.today, self.horizon_days - 1)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.today && date <= self.last_day()
    }

    pub fn all_dates(&self) -> Vec<NaiveDate> {
        self.today
            .iter_days()
            .take(self.horizon_days as usize)
            .collect()
    }

    /// The first page, starting today.
    pub fn initial(&self) -> Vec<NaiveDate> {
        self.page(self.today)
    }

    /// Dates visible from `first`, clipped to the horizon.
    pub fn page(&self, first: NaiveDate) -> Vec<NaiveDate> {
        let first = first.clamp(self.today, self.last_day());
        let last = self.last_day();

        first
            .iter_days()
            .take(self.page_days as usize)
            .take_while(|d| *d <= last)
            .collect()
    }

    /// First date of the previous page; unchanged if that would precede today.
    pub fn page_back(&self, current_first: NaiveDate) -> NaiveDate {
        match current_first.checked_sub_days(Days::new(self.page_days as u64)) {
            Some(candidate) if candidate >= self.today => candidate,
            _ => current_first,
        }
    }

    /// First date of the next page; unchanged if that would pass the horizon.
    pub fn page_forward(&self, current_first: NaiveDate) -> NaiveDate {
        match current_first.checked_add_days(Days::new(self.page_days as u64)) {
            Some(candidate) if candidate <= self.last_day() => candidate,
            _ => current_first,
        }
    }

    pub fn can_page_back(&self, current_first: NaiveDate) -> bool {
        self.page_back(current_first) != current_first
    }

    pub fn can_page_forward(&self, current_first: NaiveDate) -> bool {
        self.page_forward(current_first) != current_first
    }

    /// First date of the page that shows `date`.
    pub fn page_containing(&self, date: NaiveDate) -> NaiveDate {
        let date = date.clamp(self.today, self.last_day());
        let offset = (date - self.today).num_days() as u32;
        self.offset(self.today, offset - offset % self.page_days)
    }

    fn offset(&self, from: NaiveDate, days: u32) -> NaiveDate {
        from.checked_add_days(Days::new(days as u64)).unwrap_or(NaiveDate::MAX)
    }
}
