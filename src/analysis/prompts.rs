//! Prompt templates. Pure functions of the stored data so the same input
//! always produces the same request.

use std::fmt::Write;

use crate::store::{PortfolioWithStocks, Stock};

pub fn stock_prompt(stock: &Stock) -> String {
    format!(
        "Analyze the following monthly stock data for {symbol}:\n\n\
         Month: {month}\n\
         Open: ${open:.2}\n\
         High: ${high:.2}\n\
         Low: ${low:.2}\n\
         Close: ${close:.2}\n\
         Volume: {volume}\n\n\
         Please provide:\n\
         1. Price action summary for the month\n\
         2. Volatility assessment based on the high/low range\n\
         3. Volume interpretation\n\
         4. Key risks to watch\n\
         5. Short-term outlook and a suggested stance (buy, hold or sell)\n\n\
         Keep the analysis concise and actionable.",
        symbol = stock.symbol,
        month = stock.month,
        open = stock.open,
        high = stock.high,
        low = stock.low,
        close = stock.close,
        volume = stock.volume,
    )
}

pub fn portfolio_prompt(portfolio: &PortfolioWithStocks) -> String {
    let mut holdings = String::new();
    let mut total_close = 0.0;
    for (i, s) in portfolio.stocks.iter().enumerate() {
        total_close += s.close;
        let _ = writeln!(
            holdings,
            "{n}. {symbol} ({month}): open ${open:.2}, high ${high:.2}, low ${low:.2}, close ${close:.2}, volume {volume}",
            n = i + 1,
            symbol = s.symbol,
            month = s.month,
            open = s.open,
            high = s.high,
            low = s.low,
            close = s.close,
            volume = s.volume,
        );
    }

    format!(
        "Analyze the following stock portfolio \"{name}\" with {count} holdings:\n\n\
         {holdings}\n\
         Total close value (one share each): ${total_close:.2}\n\n\
         Please provide:\n\
         1. Overall portfolio assessment\n\
         2. Diversification and concentration risk\n\
         3. Strongest and weakest holdings this month\n\
         4. Rebalancing suggestions\n\
         5. Outlook for the coming months\n\n\
         Keep the analysis concise and actionable.",
        name = portfolio.portfolio.name,
        count = portfolio.stocks.len(),
    )
}
